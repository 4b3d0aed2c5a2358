use anyhow::{Result, Context as AnyhowContext};
use serde::{Serialize, Deserialize};
use std::fs;
use crate::chain::DEFAULT_SHIFT;
use crate::layout::{Canvas, LayoutConfig, ViewportConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Per-request timeout. A fetch exceeding it counts as a transport failure.
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub step_interval_ms: u64,
    pub plan_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: 3_000,
            plan_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub shift: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { shift: DEFAULT_SHIFT }
    }
}

/// 可视化配置 (Visualizer Configuration)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub canvas: Canvas,
    pub graph: GraphConfig,
    pub layout: LayoutConfig,
    pub viewport: ViewportConfig,
    /// Fixed seed for reproducible layouts; random when absent.
    pub seed: Option<u64>,
}

pub fn load_config_from_yaml(file_path: &str) -> Result<VisualizerConfig> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read config file from {}", file_path))?;

    let config: VisualizerConfig = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize config from {}", file_path))?;

    Ok(config)
}
