//! Image filter service configuration

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::engine::Device;

/// Filters served by the default configuration, in display order.
pub const DEFAULT_FILTERS: [(&str, &str); 3] = [
    ("L0-Smoothing", "ckpt/L0-smoothing/model.onnx"),
    ("Photographic-Style", "ckpt/Photographic-Style/model.onnx"),
    ("Pencil", "ckpt/Pencil/model.onnx"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub device: Device,
    /// Side of the square probe image used to check each model after
    /// loading; 0 disables the check.
    #[serde(default = "default_probe_size")]
    pub probe_size: usize,
    /// Path to the ONNX Runtime shared library. Falls back to
    /// `ORT_DYLIB_PATH` / the system search path when unset.
    #[serde(default)]
    pub runtime_library: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    pub label: String,
    pub checkpoint: PathBuf,
}

fn default_probe_size() -> usize {
    32
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Like [`Config::load`], but a file that does not exist yields the
    /// built-in defaults. Parse and validation errors are still returned.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} not found, using default config", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading config {}", path.display())),
        }
    }

    /// Config for the process: an explicit path must load, the default path
    /// may be absent.
    pub fn resolve(explicit: Option<&str>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_or_default(Self::default_path()),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }

    /// Labels must be non-empty and unique, and at least one filter must be
    /// configured.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.filters.is_empty() {
            anyhow::bail!("no filters configured");
        }
        let mut seen = HashSet::new();
        for filter in &self.filters {
            if filter.label.trim().is_empty() {
                anyhow::bail!("filter label must not be empty");
            }
            if !seen.insert(filter.label.as_str()) {
                anyhow::bail!("duplicate filter label: {}", filter.label);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 7860,
                title: "Fast Image Filters using CNN".to_string(),
                description: "Implementation of image filters using CNN".to_string(),
            },
            inference: InferenceConfig {
                device: Device::Cpu,
                probe_size: default_probe_size(),
                runtime_library: None,
            },
            filters: DEFAULT_FILTERS
                .iter()
                .map(|(label, checkpoint)| FilterConfig {
                    label: label.to_string(),
                    checkpoint: PathBuf::from(checkpoint),
                })
                .collect(),
        }
    }
}
