//! Service layer types

use serde::{Deserialize, Serialize};

/// Encoded result of applying a filter to an uploaded image
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub label: String,
    /// PNG-encoded filtered image.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub inference_time_ms: u64,
}

/// Loaded filter and the device it runs on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStatus {
    pub label: String,
    pub device: String,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    pub filters: Vec<FilterStatus>,
}
