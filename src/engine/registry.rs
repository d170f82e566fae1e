//! Model Registry
//!
//! Maps filter labels to loaded models. Every configured checkpoint is loaded
//! up front; the registry is immutable once built and is shared by `Arc`
//! between request handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use super::checkpoint;
use super::{Device, FilterModel};
use crate::config::{FilterConfig, InferenceConfig};
use crate::error::{FilterError, Result};

/// Read-only label → model mapping
pub struct ModelRegistry {
    labels: Vec<String>,
    models: HashMap<String, Arc<dyn FilterModel>>,
}

impl ModelRegistry {
    /// Load every filter from its checkpoint on the configured device.
    ///
    /// Stops at the first failure; no partially loaded registry is returned.
    pub fn load(inference: &InferenceConfig, filters: &[FilterConfig]) -> Result<Self> {
        let device = inference.device;
        let probe_size = inference.probe_size;
        Self::build_with(filters, |filter| {
            let model = checkpoint::load_verified(&filter.checkpoint, device, probe_size)?;
            Ok(Arc::new(model) as Arc<dyn FilterModel>)
        })
    }

    /// Build the registry using `loader` to produce each model.
    pub fn build_with<F>(filters: &[FilterConfig], mut loader: F) -> Result<Self>
    where
        F: FnMut(&FilterConfig) -> Result<Arc<dyn FilterModel>>,
    {
        let start = Instant::now();
        let mut labels = Vec::with_capacity(filters.len());
        let mut models = HashMap::with_capacity(filters.len());

        for filter in filters {
            info!(
                "Loading filter: {} from {}",
                filter.label,
                filter.checkpoint.display()
            );
            let model = loader(filter).map_err(|e| {
                error!("Failed to load filter {}: {}", filter.label, e);
                e
            })?;
            if models.insert(filter.label.clone(), model).is_some() {
                return Err(FilterError::corrupt(
                    &filter.checkpoint,
                    format!("duplicate filter label {}", filter.label),
                ));
            }
            labels.push(filter.label.clone());
        }

        info!("{} filters loaded in {:?}", labels.len(), start.elapsed());
        Ok(Self { labels, models })
    }

    /// Build from already-loaded models, keeping the given order.
    pub fn from_models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn FilterModel>)>,
        S: Into<String>,
    {
        let mut labels = Vec::new();
        let mut map = HashMap::new();
        for (label, model) in models {
            let label = label.into();
            if map.insert(label.clone(), model).is_none() {
                labels.push(label);
            }
        }
        Self { labels, models: map }
    }

    /// Look up a model by label.
    pub fn get(&self, label: &str) -> Result<&dyn FilterModel> {
        self.models
            .get(label)
            .map(|m| m.as_ref())
            .ok_or_else(|| FilterError::UnknownFilter(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.models.contains_key(label)
    }

    /// Labels in configured order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Device of every loaded filter.
    pub fn status(&self) -> Vec<(String, Device)> {
        self.labels
            .iter()
            .filter_map(|label| {
                self.models
                    .get(label)
                    .map(|m| (label.clone(), m.device()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::pipeline::tests::IdentityModel;
    use crate::engine::tensor::Nchw;
    use std::path::PathBuf;

    fn identity() -> Arc<dyn FilterModel> {
        Arc::new(IdentityModel)
    }

    #[test]
    fn test_registry_has_configured_labels() {
        let config = Config::default();
        let registry = ModelRegistry::build_with(&config.filters, |_| Ok(identity())).unwrap();

        assert_eq!(
            registry.labels(),
            &["L0-Smoothing", "Photographic-Style", "Pencil"]
        );
        assert_eq!(registry.len(), 3);
        for label in registry.labels() {
            let model = registry.get(label).unwrap();
            let out = model.forward(Nchw::zeros(2, 2)).unwrap();
            assert_eq!(out.shape(), &[1, 3, 2, 2]);
        }
    }

    #[test]
    fn test_unknown_label() {
        let registry = ModelRegistry::from_models([("Pencil", identity())]);
        assert!(registry.contains("Pencil"));
        assert!(matches!(
            registry.get("Sepia"),
            Err(FilterError::UnknownFilter(label)) if label == "Sepia"
        ));
    }

    #[test]
    fn test_no_partial_registry() {
        let config = Config::default();
        let mut calls = 0;
        let result = ModelRegistry::build_with(&config.filters, |filter| {
            calls += 1;
            if filter.label == "Photographic-Style" {
                Err(FilterError::CheckpointNotFound {
                    path: filter.checkpoint.clone(),
                })
            } else {
                Ok(identity())
            }
        });
        assert!(matches!(result, Err(FilterError::CheckpointNotFound { .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_load_missing_checkpoints() {
        let config = Config::default();
        let filters = vec![FilterConfig {
            label: "L0-Smoothing".to_string(),
            checkpoint: PathBuf::from("/nonexistent/smooth.onnx"),
        }];
        let err = ModelRegistry::load(&config.inference, &filters).err().unwrap();
        assert!(err.is_startup_fatal());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let filters = vec![
            FilterConfig {
                label: "Pencil".to_string(),
                checkpoint: PathBuf::from("a.onnx"),
            },
            FilterConfig {
                label: "Pencil".to_string(),
                checkpoint: PathBuf::from("b.onnx"),
            },
        ];
        assert!(ModelRegistry::build_with(&filters, |_| Ok(identity())).is_err());
    }

    #[test]
    fn test_status_reports_device() {
        let registry = ModelRegistry::from_models([("L0-Smoothing", identity())]);
        assert_eq!(
            registry.status(),
            vec![("L0-Smoothing".to_string(), Device::Cpu)]
        );
    }
}
