pub mod batch;
pub mod count;

use anyhow::{Context as _, Result};
use carton_count_stack::StackCountingConfig;
use clap::Args;
use std::path::PathBuf;

/// Options shared by every counting command
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Counting configuration (YAML, or JSON by extension)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pile-type database, overrides the configured one
    #[arg(long, value_name = "FILE")]
    pile_config: Option<PathBuf>,

    /// ONNX carton model, overrides the configured one
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Minimum detection confidence, overrides the configured one
    #[arg(long)]
    confidence: Option<f32>,
}

impl ConfigArgs {
    /// Resolve the effective configuration: file first, then flag overrides
    pub fn load(&self) -> Result<StackCountingConfig> {
        let mut config = match &self.config {
            Some(path) => StackCountingConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => StackCountingConfig::default(),
        };
        if let Some(path) = &self.pile_config {
            config.pile_config_path = Some(path.clone());
        }
        if let Some(path) = &self.model {
            config.model_path = Some(path.clone());
        }
        if let Some(confidence) = self.confidence {
            config.confidence_threshold = confidence;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
