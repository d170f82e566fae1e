//! Utility modules

pub mod image;
