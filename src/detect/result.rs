use serde::Deserialize;

/// One object instance reported by the inference service.
///
/// Geometry is center-based and expressed in the natural pixel space of the
/// submitted image.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_label: String,
    /// Fraction in `0.0..=1.0`.
    pub confidence: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Detection {
    /// Top-left-origin rectangle covering this detection.
    pub fn rect(&self) -> BoxRect {
        BoxRect {
            x: self.center_x - self.width / 2.0,
            y: self.center_y - self.height / 2.0,
            width: self.width,
            height: self.height,
        }
    }

    /// Confidence as a percentage (0..=100).
    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

/// Axis-aligned rectangle with a top-left origin, in natural pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Response body of the hosted detection endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct PredictionResponse {
    /// Absent and empty both mean "nothing detected".
    #[serde(default)]
    pub predictions: Option<Vec<Prediction>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Prediction {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Prediction {
    pub(crate) fn into_detection(self) -> Option<Detection> {
        let finite = [self.confidence, self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return None;
        }
        Some(Detection {
            class_label: self.class_label,
            confidence: self.confidence.clamp(0.0, 1.0),
            center_x: self.x,
            center_y: self.y,
            width: self.width,
            height: self.height,
        })
    }
}
