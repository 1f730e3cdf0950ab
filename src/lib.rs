//! Carton Count - stack counting for warehouse bin captures
//!
//! Umbrella crate re-exporting the workspace libraries:
//!
//! - [`common`]: geometry, detections, statistics and the shared error type
//! - [`depth`]: depth map loading and robust point sampling
//! - [`detection`]: carton detectors (sidecar JSON, ONNX YOLO behind `onnx`)
//! - [`stack`]: layer clustering, classification and counting strategies

pub use carton_count_common as common;
pub use carton_count_depth as depth;
pub use carton_count_detection as detection;
pub use carton_count_stack as stack;

pub use carton_count_common::{CountError, Detection, DetectionClass, Rect, Result};
pub use carton_count_stack::{count_boxes, CountReport, StackCountingConfig, StackProcessorFactory};
