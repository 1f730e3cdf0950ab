//! `YOLOv8` carton detector via ONNX Runtime
//!
//! The session is created on the first call to [`CartonDetector::detect`] and
//! cached for reuse. `Session::run` needs `&mut self`, so the cached session
//! sits behind a mutex and the detector stays shareable across threads.

use crate::postprocess::decode_yolo_output;
use crate::{CartonDetector, DetectionError, DetectorConfig};
use carton_count_common::Detection;
use image::RgbImage;
use ndarray::Array;
use once_cell::sync::OnceCell;
use ort::{session::Session, value::TensorRef};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Carton detector running a `YOLOv8` ONNX export with `pile`/`box`/`top` classes
pub struct YoloCartonDetector {
    model_path: PathBuf,
    config: DetectorConfig,
    session: OnceCell<Mutex<Session>>,
}

impl YoloCartonDetector {
    /// Create a detector; the model file must exist but is loaded lazily
    pub fn new(model_path: impl AsRef<Path>, config: DetectorConfig) -> Result<Self, DetectionError> {
        let model_path = model_path.as_ref().to_path_buf();
        if !model_path.exists() {
            return Err(DetectionError::ModelNotFound(model_path));
        }
        if config.input_size == 0 {
            return Err(DetectionError::Config("input_size must be positive".to_string()));
        }
        Ok(Self {
            model_path,
            config,
            session: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn get_or_load_session(&self) -> Result<&Mutex<Session>, DetectionError> {
        self.session.get_or_try_init(|| {
            info!(
                "Loading YOLO model from {} (first time only)",
                self.model_path.display()
            );
            let session = Session::builder()
                .map_err(|e| DetectionError::ModelLoad(e.to_string()))?
                .commit_from_file(&self.model_path)
                .map_err(|e| DetectionError::ModelLoad(e.to_string()))?;
            info!("YOLO model loaded and cached for reuse");
            Ok(Mutex::new(session))
        })
    }

    /// Resize to the model input and convert to normalized CHW `(1, 3, H, W)`
    fn preprocess(&self, image: &RgbImage) -> Array<f32, ndarray::Dim<[usize; 4]>> {
        let input_size = self.config.input_size;
        let resized = image::imageops::resize(
            image,
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let mut input = Array::zeros((1, 3, input_size as usize, input_size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
            input[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
            input[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
        }
        input
    }
}

impl CartonDetector for YoloCartonDetector {
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>, DetectionError> {
        let image = image::open(image_path)?.to_rgb8();
        debug!(
            "Running carton detection on {}x{} image",
            image.width(),
            image.height()
        );

        let input = self.preprocess(&image);
        let session = self.get_or_load_session()?;
        let mut session = session
            .lock()
            .map_err(|_| DetectionError::Inference("ONNX session mutex poisoned".to_string()))?;

        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            DetectionError::Inference(format!("Failed to extract tensor: {e}"))
        })?;
        debug!("ONNX output shape: {:?}", shape);
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let detections =
            decode_yolo_output(data, &dims, &self.config, (image.width(), image.height()))?;
        info!("Detected {} objects", detections.len());
        Ok(detections)
    }
}
