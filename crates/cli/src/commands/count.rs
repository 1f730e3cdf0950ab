//! Single capture mode

use super::ConfigArgs;
use anyhow::{Context as _, Result};
use carton_count_stack::{CountOutcome, StackProcessorFactory};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Args)]
pub struct CountCommand {
    /// RGB capture of the pile
    #[arg(long, value_name = "FILE")]
    image: PathBuf,

    /// Pile type id used for template lookup
    #[arg(long)]
    pile_id: u32,

    /// Depth map (16-bit PNG, disparity image or CSV matrix)
    #[arg(long, value_name = "FILE")]
    depth: Option<PathBuf>,

    /// Print the full report as JSON
    #[arg(long, default_value = "false")]
    json: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

impl CountCommand {
    pub fn execute(self) -> Result<()> {
        let start = Instant::now();
        if !self.image.exists() {
            anyhow::bail!("Input image does not exist: {}", self.image.display());
        }

        let factory = StackProcessorFactory::new(self.config.load()?)
            .context("Failed to create stack processor")?;
        let report = factory
            .count_detailed(&self.image, self.pile_id, self.depth.as_deref())
            .with_context(|| format!("Failed to count {}", self.image.display()))?;

        info!(
            "Counted {} in {:.3}s",
            self.image.display(),
            start.elapsed().as_secs_f64()
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        match report.outcome {
            CountOutcome::Counted => {
                let strategy = report
                    .strategy
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                println!(
                    "{}: {} cartons ({} layers, {})",
                    self.image.display(),
                    report.total,
                    report.layer_count,
                    strategy
                );
                if report.template_synthesized {
                    println!("  pile type {} unknown, template taken from observed layers", self.pile_id);
                }
            }
            outcome => println!("{}: 0 cartons ({outcome:?})", self.image.display()),
        }
        Ok(())
    }
}
