//! Processing factory: detector, scene, layers, classification, strategy
//!
//! The factory holds configuration and lazily created collaborator handles.
//! Everything derived from one capture lives in a [`CountContext`] built per
//! call, so a single factory can serve concurrent callers.

use crate::classifier::{ClassificationReason, ClassificationResult, ClassificationStatus, FullLayerClassifier};
use crate::clustering::LayerClusterer;
use crate::config::StackCountingConfig;
use crate::filter::{sort_and_reindex, LayerFilter};
use crate::scene::{PileSceneSelector, SceneSelector};
use crate::strategy::{ProcessingDetails, ProcessingResult, StackStrategy, StrategyTag};
use crate::template::{PileTypeDatabase, TemplateSource};
use crate::types::{CountContext, Layer, PileRoi, TemplateLayers};
use carton_count_common::{CountError, ImageSize, Result};
use carton_count_depth::{DepthMatrix, DepthProvider, FileDepthProvider};
use carton_count_detection::{CartonDetector, SidecarDetector};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountOutcome {
    Counted,
    NoDetections,
    NoPile,
    NoLayers,
}

/// Serializable summary of one `count` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountReport {
    pub pile_id: u32,
    pub total: u32,
    pub outcome: CountOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClassificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ClassificationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyTag>,
    pub layer_count: usize,
    pub template: TemplateLayers,
    pub template_synthesized: bool,
    pub depth_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ProcessingDetails>,
}

impl CountReport {
    fn empty(pile_id: u32, outcome: CountOutcome, depth_used: bool) -> Self {
        Self {
            pile_id,
            total: 0,
            outcome,
            status: None,
            reason: None,
            strategy: None,
            layer_count: 0,
            template: TemplateLayers::default(),
            template_synthesized: false,
            depth_used,
            details: None,
        }
    }
}

pub struct StackProcessorFactory {
    config: StackCountingConfig,
    clusterer: LayerClusterer,
    filter: LayerFilter,
    classifier: FullLayerClassifier,
    detector: OnceCell<Arc<dyn CartonDetector>>,
    templates: OnceCell<Arc<dyn TemplateSource>>,
    scene: Arc<dyn SceneSelector>,
    depth_provider: Arc<dyn DepthProvider>,
}

impl StackProcessorFactory {
    /// Create a factory; configured model and pile files must exist
    pub fn new(config: StackCountingConfig) -> Result<Self> {
        config.validate()?;
        if let Some(model) = &config.model_path {
            if !model.exists() {
                return Err(CountError::ModelNotFound(model.clone()));
            }
        }
        if let Some(piles) = &config.pile_config_path {
            if !piles.exists() {
                return Err(CountError::ConfigNotFound(piles.clone()));
            }
        }

        let filter = LayerFilter::new(config.width_ratio_thr, config.height_filter_ratio);
        Ok(Self {
            clusterer: LayerClusterer::new(config.gap_ratio),
            filter,
            classifier: FullLayerClassifier::new(config.coverage_threshold, config.cv_gap_threshold, filter),
            detector: OnceCell::new(),
            templates: OnceCell::new(),
            scene: Arc::new(PileSceneSelector),
            depth_provider: Arc::new(FileDepthProvider::new(config.depth_loading.clone())),
            config,
        })
    }

    /// Use `detector` instead of the one derived from configuration
    #[must_use]
    pub fn with_detector(self, detector: Arc<dyn CartonDetector>) -> Self {
        Self {
            detector: OnceCell::with_value(detector),
            ..self
        }
    }

    /// Use `templates` instead of the configured pile database
    #[must_use]
    pub fn with_templates(self, templates: Arc<dyn TemplateSource>) -> Self {
        Self {
            templates: OnceCell::with_value(templates),
            ..self
        }
    }

    #[must_use]
    pub fn with_scene_selector(self, scene: Arc<dyn SceneSelector>) -> Self {
        Self { scene, ..self }
    }

    #[must_use]
    pub fn with_depth_provider(self, depth_provider: Arc<dyn DepthProvider>) -> Self {
        Self {
            depth_provider,
            ..self
        }
    }

    #[must_use]
    pub fn config(&self) -> &StackCountingConfig {
        &self.config
    }

    fn detector(&self) -> Result<&Arc<dyn CartonDetector>> {
        self.detector.get_or_try_init(|| build_detector(&self.config))
    }

    fn templates(&self) -> Result<&Arc<dyn TemplateSource>> {
        self.templates.get_or_try_init(|| {
            let db = match &self.config.pile_config_path {
                Some(path) => PileTypeDatabase::load(path)?,
                None => {
                    debug!("No pile config, every template will be synthesized");
                    PileTypeDatabase::default()
                }
            };
            Ok(Arc::new(db) as Arc<dyn TemplateSource>)
        })
    }

    /// Count the cartons of `pile_id` in `image`
    pub fn count(&self, image: impl AsRef<Path>, pile_id: u32, depth: Option<&Path>) -> Result<u32> {
        Ok(self.count_detailed(image, pile_id, depth)?.total)
    }

    /// Count and report every intermediate decision
    pub fn count_detailed(
        &self,
        image: impl AsRef<Path>,
        pile_id: u32,
        depth: Option<&Path>,
    ) -> Result<CountReport> {
        let image = image.as_ref();
        if !image.exists() {
            return Err(CountError::ImageNotFound(image.to_path_buf()));
        }
        let depth = depth.and_then(|path| self.load_depth(path));
        let depth_used = depth.is_some();

        let detections = self.detector()?.detect(image)?;
        info!("{}: {} detections", image.display(), detections.len());
        if detections.is_empty() {
            return Ok(CountReport::empty(pile_id, CountOutcome::NoDetections, depth_used));
        }

        let image_size = match image::image_dimensions(image) {
            Ok((w, h)) => Some(ImageSize::new(w, h)),
            Err(e) => {
                debug!("Image size unavailable for {}: {}", image.display(), e);
                None
            }
        };

        let Some(scene) = self
            .scene
            .prepare(&detections, self.config.confidence_threshold, image_size)
        else {
            info!("No pile selected in {}", image.display());
            return Ok(CountReport::empty(pile_id, CountOutcome::NoPile, depth_used));
        };

        let layers = self.clusterer.cluster(scene.boxes);
        if layers.is_empty() {
            return Ok(CountReport::empty(pile_id, CountOutcome::NoLayers, depth_used));
        }
        let layers = self.prepare_layers(layers);
        info!(
            "{} layers: {:?}",
            layers.len(),
            layers.iter().map(Layer::box_count).collect::<Vec<_>>()
        );

        let mut template = self.templates()?.template_layers(pile_id);
        let template_synthesized = template.is_empty();
        if template_synthesized {
            template = TemplateLayers::from_layers(&layers);
            warn!(
                "No template for pile {}, using detected layers {:?}",
                pile_id,
                template.as_slice()
            );
        }

        let ctx = CountContext::new(scene.pile_roi)
            .with_detections(scene.detections)
            .with_depth(depth);
        let layer_count = layers.len();
        let (classification, result) = self.process_with_context(layers, &template, &ctx);

        info!("Pile {}: {} cartons", pile_id, result.total);
        Ok(CountReport {
            pile_id,
            total: result.total,
            outcome: CountOutcome::Counted,
            status: Some(classification.status),
            reason: Some(classification.reason),
            strategy: Some(result.strategy),
            layer_count,
            template,
            template_synthesized,
            depth_used,
            details: Some(result.details),
        })
    }

    fn load_depth(&self, path: &Path) -> Option<DepthMatrix> {
        match self.depth_provider.depth_matrix(path) {
            Ok(matrix) => Some(matrix),
            Err(e) => {
                warn!("Continuing without depth: {}", e);
                None
            }
        }
    }

    /// Optional rear suppression, fake-top removal, then top-to-bottom indexing
    fn prepare_layers(&self, layers: Vec<Layer>) -> Vec<Layer> {
        let layers = if self.config.suppress_rear_boxes {
            self.filter.suppress_rear_boxes(layers)
        } else {
            layers
        };
        sort_and_reindex(self.filter.remove_fake_top_layer(layers))
    }

    /// Classify and count prepared layers without detections or depth
    #[must_use]
    pub fn process(&self, layers: Vec<Layer>, template: &TemplateLayers, pile_roi: PileRoi) -> ProcessingResult {
        self.process_with_context(layers, template, &CountContext::new(pile_roi))
            .1
    }

    /// Classify and count prepared layers against a full per-call context
    #[must_use]
    pub fn process_with_context(
        &self,
        layers: Vec<Layer>,
        template: &TemplateLayers,
        ctx: &CountContext,
    ) -> (ClassificationResult, ProcessingResult) {
        let layers = sort_and_reindex(layers);
        let classified = self
            .classifier
            .classify(layers, template, &ctx.pile_roi, ctx.depth.as_ref());
        info!(
            "Classification: {} ({})",
            classified.result.status, classified.result.reason
        );

        let strategy = StackStrategy::from(classified.result.status);
        let result = strategy.process(
            &classified.layers,
            template,
            &classified.result,
            ctx,
            &self.config.depth_sampling,
        );
        (classified.result, result)
    }
}

fn build_detector(config: &StackCountingConfig) -> Result<Arc<dyn CartonDetector>> {
    match &config.model_path {
        None => Ok(Arc::new(SidecarDetector::new().with_config(config.detector.clone()))),
        #[cfg(feature = "onnx")]
        Some(path) => {
            use carton_count_detection::YoloCartonDetector;

            Ok(Arc::new(YoloCartonDetector::new(path, config.detector.clone())?))
        }
        #[cfg(not(feature = "onnx"))]
        Some(path) => Err(CountError::Detector(format!(
            "model {} needs the `onnx` feature",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoxRoi;
    use carton_count_common::Rect;

    fn layer(y: f32, n: usize) -> Layer {
        let boxes = (0..n)
            .map(|i| {
                let x = i as f32 * 50.0;
                BoxRoi::new(Rect::new(x, y, x + 48.0, y + 40.0).unwrap())
            })
            .collect();
        Layer::new(0, boxes)
    }

    fn pile() -> PileRoi {
        PileRoi::new(Rect::new(0.0, 0.0, 500.0, 500.0).unwrap())
    }

    #[test]
    fn test_missing_files_fail_construction() {
        let config = StackCountingConfig {
            model_path: Some("/no/such/carton.onnx".into()),
            ..Default::default()
        };
        assert!(matches!(
            StackProcessorFactory::new(config),
            Err(CountError::ModelNotFound(_))
        ));

        let config = StackCountingConfig {
            pile_config_path: Some("/no/such/piles.json".into()),
            ..Default::default()
        };
        assert!(matches!(
            StackProcessorFactory::new(config),
            Err(CountError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_missing_image() {
        let factory = StackProcessorFactory::new(StackCountingConfig::default()).unwrap();
        assert!(matches!(
            factory.count("/no/such/image.png", 1, None),
            Err(CountError::ImageNotFound(_))
        ));
    }

    #[test]
    fn test_process_reindexes_unsorted_layers() {
        let factory = StackProcessorFactory::new(StackCountingConfig::default()).unwrap();
        let layers = vec![layer(300.0, 10), layer(100.0, 10), layer(200.0, 10)];
        let result = factory.process(layers, &TemplateLayers::new(vec![10, 10, 10]), pile());
        assert_eq!(result.total, 30);
        assert_eq!(result.strategy, StrategyTag::FullMatch);
    }

    #[test]
    fn test_process_is_pure() {
        let factory = StackProcessorFactory::new(StackCountingConfig::default()).unwrap();
        let layers = vec![layer(100.0, 6), layer(200.0, 10), layer(300.0, 10)];
        let template = TemplateLayers::new(vec![10, 10, 10]);
        let a = factory.process(layers.clone(), &template, pile());
        let b = factory.process(layers, &template, pile());
        assert_eq!(a, b);
    }
}
