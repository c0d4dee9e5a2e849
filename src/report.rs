//! Human-readable detection report.

use crate::bins::bin_for;
use crate::detect::Detection;

pub const NO_WASTE_DETECTED: &str = "No biomedical waste detected.";
pub const DETECTING: &str = "Detecting...";
pub const ERROR_PREFIX: &str = "Error: ";

/// Summarise detections, one block per detection in input order.
pub fn format_report(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return NO_WASTE_DETECTED.to_string();
    }
    detections
        .iter()
        .enumerate()
        .map(|(i, detection)| format_block(i + 1, detection))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Report shown when a cycle fails before producing detections.
pub fn error_report(err: &anyhow::Error) -> String {
    format!("{}{:#}", ERROR_PREFIX, err)
}

fn format_block(index: usize, detection: &Detection) -> String {
    format!(
        "Detection {}:\nClass: {}\nConfidence: {:.2}%\nBin: {}",
        index,
        detection.class_label,
        detection.confidence_percent(),
        bin_for(&detection.class_label)
    )
}
