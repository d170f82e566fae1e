//! Service layer module

pub mod filter_service;
pub mod types;

pub use filter_service::FilterService;
pub use types::*;
