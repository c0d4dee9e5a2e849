//! Client for the hosted object-detection endpoint.
//!
//! The endpoint accepts a POST whose body is the raw base64 text of a JPEG/PNG
//! image, content-typed as `application/x-www-form-urlencoded`, authenticated by
//! an `api_key` query parameter. It answers with
//! `{"predictions": [{"class", "confidence", "x", "y", "width", "height"}]}`.
//!
//! The client makes exactly one attempt per call. There is no retry policy.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::backend::DetectionService;
use super::result::{Detection, PredictionResponse};

pub const DEFAULT_ENDPOINT: &str = "https://serverless.roboflow.com/biomedical_waste-8wf50/8";

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Endpoint + credential, injected at construction.
#[derive(Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub api_key: String,
    /// Overall request timeout. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for InferenceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            timeout: None,
        }
    }
}

pub struct HostedInferenceClient {
    agent: ureq::Agent,
    request_url: Url,
    display_endpoint: String,
}

impl HostedInferenceClient {
    pub fn new(settings: InferenceSettings) -> Result<Self> {
        let mut request_url = Url::parse(&settings.endpoint)
            .with_context(|| format!("parse inference endpoint {}", settings.endpoint))?;
        match request_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported inference endpoint scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if settings.api_key.trim().is_empty() {
            return Err(anyhow!("inference api key must not be empty"));
        }

        let display_endpoint = request_url.to_string();
        request_url
            .query_pairs_mut()
            .append_pair("api_key", settings.api_key.trim());

        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            agent: builder.build(),
            request_url,
            display_endpoint,
        })
    }

    /// Endpoint URL without credentials, safe to log.
    pub fn endpoint(&self) -> &str {
        &self.display_endpoint
    }
}

impl DetectionService for HostedInferenceClient {
    fn name(&self) -> &'static str {
        "hosted"
    }

    fn detect(&self, encoded_image: &str) -> Result<Vec<Detection>> {
        log::debug!(
            "posting {} base64 chars to {}",
            encoded_image.len(),
            self.display_endpoint
        );
        let response = match self
            .agent
            .post(self.request_url.as_str())
            .set("Content-Type", CONTENT_TYPE)
            .send_string(encoded_image)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(anyhow!(
                    "inference request failed with status code {}{}",
                    code,
                    error_body_excerpt(&body)
                ));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(anyhow!("inference request failed: {}", transport));
            }
        };

        let body = response
            .into_string()
            .context("read inference response body")?;
        parse_predictions(&body)
    }
}

/// Parse the endpoint's JSON body into detections, preserving order.
pub(crate) fn parse_predictions(body: &str) -> Result<Vec<Detection>> {
    let parsed: PredictionResponse =
        serde_json::from_str(body).map_err(|e| anyhow!("malformed inference response: {}", e))?;
    let predictions = parsed.predictions.unwrap_or_default();
    let total = predictions.len();
    let detections: Vec<Detection> = predictions
        .into_iter()
        .filter_map(|prediction| prediction.into_detection())
        .collect();
    if detections.len() != total {
        log::warn!(
            "dropped {} prediction(s) with non-finite values",
            total - detections.len()
        );
    }
    Ok(detections)
}

fn error_body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let excerpt: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!(": {}", excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str, api_key: &str) -> InferenceSettings {
        InferenceSettings {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            timeout: None,
        }
    }

    #[test]
    fn parses_predictions_in_order() -> Result<()> {
        let body = r#"{
            "predictions": [
                {"class": "Glass", "confidence": 0.873, "x": 400, "y": 300, "width": 100, "height": 50},
                {"class": "BLOOD", "confidence": 0.5, "x": 10.5, "y": 20, "width": 4, "height": 6, "class_id": 0}
            ]
        }"#;
        let detections = parse_predictions(body)?;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_label, "Glass");
        assert_eq!(detections[0].center_x, 400.0);
        assert_eq!(detections[1].class_label, "BLOOD");
        assert_eq!(detections[1].center_x, 10.5);
        Ok(())
    }

    #[test]
    fn confidence_keeps_double_precision() -> Result<()> {
        let body = r#"{"predictions": [
            {"class": "Glass", "confidence": 0.50055, "x": 1, "y": 1, "width": 1, "height": 1}
        ]}"#;
        let detections = parse_predictions(body)?;
        assert_eq!(detections[0].confidence, 0.50055);
        assert_eq!(
            crate::report::format_report(&detections),
            "Detection 1:\nClass: Glass\nConfidence: 50.06%\nBin: 🔵 Blue Bin → Uncontaminated or disinfected glassware, bottles, vials"
        );
        Ok(())
    }

    #[test]
    fn absent_or_empty_predictions_mean_nothing_detected() -> Result<()> {
        assert!(parse_predictions(r#"{"predictions": []}"#)?.is_empty());
        assert!(parse_predictions(r#"{"time": 0.1}"#)?.is_empty());
        assert!(parse_predictions(r#"{"predictions": null}"#)?.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_bodies_are_errors() {
        let err = parse_predictions("<html>bad gateway</html>").unwrap_err();
        assert!(err.to_string().starts_with("malformed inference response"));

        let err = parse_predictions(r#"{"predictions": [{"class": "Glass"}]}"#).unwrap_err();
        assert!(err.to_string().starts_with("malformed inference response"));
    }

    #[test]
    fn api_key_is_required_and_kept_out_of_display_endpoint() -> Result<()> {
        assert!(HostedInferenceClient::new(settings(DEFAULT_ENDPOINT, "  ")).is_err());
        assert!(HostedInferenceClient::new(settings("ftp://example.com/model", "k")).is_err());

        let client = HostedInferenceClient::new(settings(DEFAULT_ENDPOINT, "secret"))?;
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
        assert!(client.request_url.as_str().ends_with("?api_key=secret"));
        Ok(())
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let rendered = format!("{:?}", settings(DEFAULT_ENDPOINT, "secret"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn error_excerpt_is_bounded() {
        assert_eq!(error_body_excerpt("   "), "");
        let long = "x".repeat(1_000);
        assert_eq!(error_body_excerpt(&long).len(), MAX_ERROR_BODY_CHARS + 2);
    }
}
