//! Smoke Test Suite - end to end through the umbrella crate
//!
//! Tests cover:
//! - One-shot counting with a pile database and sidecar detections
//! - Depth map plumbing from CSV into a partial-pile report
//! - Error handling for a missing capture

use anyhow::Result;
use carton_count::depth::load_depth_csv;
use carton_count::depth::sampling::{sample_depth, DepthSamplingConfig};
use carton_count::stack::{ClassificationStatus, CountOutcome};
use carton_count::{count_boxes, CountError, Detection, DetectionClass, Rect, StackCountingConfig, StackProcessorFactory};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Capture whose layers hold `rows` boxes, top first
fn write_capture(dir: &Path, name: &str, rows: &[usize]) -> Result<PathBuf> {
    let image = dir.join(format!("{name}.jpeg"));
    RgbImage::from_pixel(1000, 700, Rgb([120, 100, 70])).save(&image)?;

    let mut dets = vec![Detection::new(DetectionClass::Pile, Rect::new(0.0, 0.0, 1000.0, 700.0)?, 0.97)];
    for (r, &n) in rows.iter().enumerate() {
        let y = 100.0 + r as f32 * 110.0;
        let pitch = if n >= 12 { 80.0 } else { 170.0 };
        for i in 0..n {
            let x = 15.0 + i as f32 * pitch;
            dets.push(Detection::new(DetectionClass::Box, Rect::new(x, y, x + 76.0, y + 90.0)?, 0.88));
        }
    }
    fs::write(dir.join(format!("{name}.detections.json")), serde_json::to_string(&dets)?)?;
    Ok(image)
}

fn config(dir: &Path) -> Result<StackCountingConfig> {
    let piles = dir.join("pile_config.json");
    fs::write(
        &piles,
        r#"{"piles": [{"pile_id": 12, "name": "twelve by four", "template_layers": [12, 12, 12, 12]}]}"#,
    )?;
    Ok(StackCountingConfig {
        pile_config_path: Some(piles),
        ..Default::default()
    })
}

#[test]
fn test_count_boxes_full_pile() -> Result<()> {
    let dir = TempDir::new()?;
    let image = write_capture(dir.path(), "full", &[12, 12, 12, 12])?;
    assert_eq!(count_boxes(&image, 12, None, config(dir.path())?)?, 48);
    Ok(())
}

#[test]
fn test_partial_pile_with_depth_csv() -> Result<()> {
    let dir = TempDir::new()?;
    let image = write_capture(dir.path(), "partial", &[5, 12, 12, 12])?;
    let depth = dir.path().join("depth.csv");
    let row = vec!["1800"; 100].join(",");
    fs::write(&depth, vec![row; 70].join("\n"))?;

    let matrix = load_depth_csv(&depth)?;
    assert_eq!((matrix.width(), matrix.height()), (100, 70));
    let sample = sample_depth(&matrix, 0.5, 0.5, &DepthSamplingConfig::default())?;
    assert_eq!(sample.value, 1800.0);

    let factory = StackProcessorFactory::new(config(dir.path())?)?;
    let report = factory.count_detailed(&image, 12, Some(&depth))?;
    assert_eq!(report.outcome, CountOutcome::Counted);
    assert_eq!(report.status, Some(ClassificationStatus::Partial));
    assert!(report.depth_used);
    assert_eq!(report.total, 41);
    Ok(())
}

#[test]
fn test_missing_capture_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let result = count_boxes(dir.path().join("absent.jpeg"), 12, None, config(dir.path())?);
    assert!(matches!(result, Err(CountError::ImageNotFound(_))));
    Ok(())
}
