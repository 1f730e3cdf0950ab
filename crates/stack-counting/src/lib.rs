//! Carton stack counting from a single pile capture
//!
//! Detections of one image are turned into a carton count in five stages:
//! layer clustering, layer filtering, full-layer classification, strategy
//! processing and, around them, the [`StackProcessorFactory`] that drives the
//! detector, scene selection and template lookup.
//!
//! # Features
//! - Layer clustering by vertical-gap continuity
//! - Rear-row suppression, fake-top-layer removal and top-layer height filtering
//! - Full / partial / single-layer classification from coverage and gap regularity
//! - Template reconciliation per pile type, synthesized when the type is unknown
//! - Depth sampling of the top layer, reported as diagnostics
//!
//! # Example
//! ```no_run
//! use carton_count_stack::{StackCountingConfig, StackProcessorFactory};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StackCountingConfig {
//!     pile_config_path: Some("config/pile_config.json".into()),
//!     ..Default::default()
//! };
//! let factory = StackProcessorFactory::new(config)?;
//!
//! let report = factory.count_detailed("bins/A-01/main.jpeg", 1, Some(Path::new("bins/A-01/depth.png")))?;
//! println!("{} cartons ({:?})", report.total, report.strategy);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod clustering;
pub mod config;
pub mod factory;
pub mod filter;
pub mod scene;
pub mod strategy;
pub mod template;
pub mod types;

pub use classifier::{
    ClassificationReason, ClassificationResult, ClassificationStatus, FullLayerClassifier, LayerMetrics,
    TopLayerStats,
};
pub use clustering::LayerClusterer;
pub use config::StackCountingConfig;
pub use factory::{CountOutcome, CountReport, StackProcessorFactory};
pub use filter::{sort_and_reindex, LayerFilter};
pub use scene::{PileSceneSelector, PreparedScene, SceneSelector};
pub use strategy::{DepthOutcome, ProcessingDetails, ProcessingResult, StackStrategy, StrategyTag};
pub use template::{PileType, PileTypeDatabase, TemplateSource};
pub use types::{BoxRoi, CountContext, Layer, PileRoi, TemplateLayers};

use carton_count_common::Result;
use std::path::Path;

/// Count cartons in one capture with a freshly built factory
///
/// Prefer a shared [`StackProcessorFactory`] when counting many images, so
/// the detector and template database are loaded once.
pub fn count_boxes(
    image: impl AsRef<Path>,
    pile_id: u32,
    depth: Option<&Path>,
    config: StackCountingConfig,
) -> Result<u32> {
    StackProcessorFactory::new(config)?.count(image, pile_id, depth)
}
