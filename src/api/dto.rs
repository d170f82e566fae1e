//! REST API request/response data transfer objects

use serde::Serialize;

/// Filter listing response
#[derive(Debug, Serialize)]
pub struct FiltersResponse {
    pub filters: Vec<String>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub filters: Vec<FilterStatusDto>,
}

#[derive(Debug, Serialize)]
pub struct FilterStatusDto {
    pub label: String,
    pub device: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
