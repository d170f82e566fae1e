//! Filter Service - dispatches uploads to the selected filter
//!
//! Holds the read-only model registry and routes each request to the
//! inference pipeline.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::engine::{pipeline, HwcImage, ModelRegistry};
use crate::error::{FilterError, Result};
use crate::utils::image::{decode_image, encode_png};

use super::types::*;

/// Routes images to filters by label
pub struct FilterService {
    registry: Arc<ModelRegistry>,
}

impl FilterService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Labels of the available filters, in configured order.
    pub fn filters(&self) -> Vec<String> {
        self.registry.labels().to_vec()
    }

    /// Apply the filter registered under `label` to `image`.
    pub fn apply(&self, label: &str, image: &HwcImage) -> Result<HwcImage> {
        let model = self.registry.get(label)?;
        info!("Applying filter: {}", label);
        pipeline::run(model, image)
    }

    /// Decode an upload, filter it on a blocking worker, and encode the
    /// result as PNG.
    pub async fn apply_encoded(&self, label: &str, image_data: &[u8]) -> Result<FilterOutput> {
        let start = Instant::now();

        // Unknown labels never reach the decoder or the pipeline.
        if !self.registry.contains(label) {
            return Err(FilterError::UnknownFilter(label.to_string()));
        }

        let registry = self.registry.clone();
        let label_owned = label.to_string();
        let image_data = image_data.to_vec();

        let filtered = tokio::task::spawn_blocking(move || {
            let image = decode_image(&image_data)?;
            let service = FilterService::new(registry);
            service.apply(&label_owned, &image)
        })
        .await
        .map_err(|e| FilterError::inference(format!("worker task failed: {e}")))??;

        let (height, width, _) = filtered.dim();
        let png = encode_png(&filtered)?;
        let inference_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "Filter {} applied to {}x{} image in {}ms",
            label, width, height, inference_time_ms
        );

        Ok(FilterOutput {
            label: label.to_string(),
            png,
            width: width as u32,
            height: height as u32,
            inference_time_ms,
        })
    }

    /// Readiness and loaded filters.
    pub fn health(&self) -> HealthResult {
        let filters = self
            .registry
            .status()
            .into_iter()
            .map(|(label, device)| FilterStatus {
                label,
                device: device.to_string(),
            })
            .collect();

        HealthResult {
            healthy: !self.registry.is_empty(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            filters,
        }
    }
}
