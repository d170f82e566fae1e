//! API module - REST handlers and the demo page

pub mod dto;
pub mod rest;

pub use rest::{create_rest_router, AppState};
