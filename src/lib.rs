//! Fast Image Filters Library
//!
//! CNN image filters (L0 smoothing, photographic style, pencil sketch)
//! loaded from exported checkpoints and served over HTTP.

pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod api;
pub mod utils;

pub use config::Config;
pub use error::FilterError;
