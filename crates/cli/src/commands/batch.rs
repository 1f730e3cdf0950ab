//! Batch mode - many captures, one shared factory, parallel counting
//!
//! The manifest is a JSON array of captures:
//!
//! ```json
//! [{"image": "A-01/main.jpeg", "pile_id": 3, "depth": "A-01/depth.png"}]
//! ```
//!
//! Relative paths resolve against the manifest's directory. Results are
//! printed as JSON lines in manifest order.

use super::ConfigArgs;
use anyhow::{Context as _, Result};
use carton_count_stack::{CountReport, StackProcessorFactory};
use clap::Args;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct BatchCommand {
    /// JSON manifest listing captures
    #[arg(long, value_name = "FILE")]
    manifest: PathBuf,

    /// Worker threads (defaults to available cores)
    #[arg(long)]
    threads: Option<usize>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestEntry {
    pub image: PathBuf,
    pub pile_id: u32,
    #[serde(default)]
    pub depth: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BatchLine<'a> {
    image: &'a Path,
    pile_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<CountReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Parse a manifest and resolve relative paths against `base`
pub fn parse_manifest(contents: &str, base: &Path) -> Result<Vec<ManifestEntry>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(contents).context("Failed to parse manifest")?;
    let resolve = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
    Ok(entries
        .into_iter()
        .map(|e| ManifestEntry {
            image: resolve(e.image),
            pile_id: e.pile_id,
            depth: e.depth.map(resolve),
        })
        .collect())
}

impl BatchCommand {
    pub fn execute(self) -> Result<()> {
        let start = Instant::now();
        let contents = std::fs::read_to_string(&self.manifest)
            .with_context(|| format!("Failed to read manifest {}", self.manifest.display()))?;
        let base = self.manifest.parent().unwrap_or_else(|| Path::new("."));
        let entries = parse_manifest(&contents, base)?;
        info!("Batch of {} captures from {}", entries.len(), self.manifest.display());

        let factory = StackProcessorFactory::new(self.config.load()?)
            .context("Failed to create stack processor")?;

        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = self.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build().context("Failed to build thread pool")?;

        let failed = AtomicUsize::new(0);
        let results: Vec<(usize, std::result::Result<CountReport, String>)> = pool.install(|| {
            entries
                .par_iter()
                .enumerate()
                .map(|(i, entry)| {
                    debug!("Counting {}", entry.image.display());
                    let result = factory
                        .count_detailed(&entry.image, entry.pile_id, entry.depth.as_deref())
                        .map_err(|e| {
                            warn!("{}: {e}", entry.image.display());
                            failed.fetch_add(1, Ordering::Relaxed);
                            e.to_string()
                        });
                    (i, result)
                })
                .collect()
        });

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for (i, result) in results {
            let entry = &entries[i];
            let (report, error) = match result {
                Ok(report) => (Some(report), None),
                Err(e) => (None, Some(e)),
            };
            let line = BatchLine {
                image: &entry.image,
                pile_id: entry.pile_id,
                report,
                error,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }

        let failed = failed.load(Ordering::Relaxed);
        info!(
            "Batch complete: {} counted, {} failed in {:.2}s",
            entries.len() - failed,
            failed,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
