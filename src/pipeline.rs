//! One capture -> inference -> report cycle.
//!
//! Cycles run on worker threads and hand their result back over an mpsc
//! channel. Whoever owns the `ScanSession` decides whether the result is still
//! current (see `ScanSession::complete`).

use anyhow::{Context, Result};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::capture::PendingPayload;
use crate::detect::{Detection, DetectionService};
use crate::payload::ImagePayload;
use crate::report::{error_report, format_report};
use crate::session::Ticket;

/// What a cycle produced, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutcome {
    pub detections: Vec<Detection>,
    pub report: String,
    pub failed: bool,
}

impl CycleOutcome {
    pub fn success(detections: Vec<Detection>) -> Self {
        let report = format_report(&detections);
        Self {
            detections,
            report,
            failed: false,
        }
    }

    /// Failed cycles carry no detections.
    pub fn failure(err: &anyhow::Error) -> Self {
        Self {
            detections: Vec::new(),
            report: error_report(err),
            failed: true,
        }
    }
}

/// Image handed to a cycle: already decoded, or still decoding.
pub enum CaptureInput {
    Ready(ImagePayload),
    Pending(PendingPayload),
}

impl CaptureInput {
    pub fn encoded(&self) -> &str {
        match self {
            CaptureInput::Ready(payload) => payload.encoded(),
            CaptureInput::Pending(pending) => pending.encoded(),
        }
    }

    fn into_payload(self) -> Result<ImagePayload> {
        match self {
            CaptureInput::Ready(payload) => Ok(payload),
            CaptureInput::Pending(pending) => pending.wait(),
        }
    }
}

impl From<ImagePayload> for CaptureInput {
    fn from(payload: ImagePayload) -> Self {
        CaptureInput::Ready(payload)
    }
}

impl From<PendingPayload> for CaptureInput {
    fn from(pending: PendingPayload) -> Self {
        CaptureInput::Pending(pending)
    }
}

/// Completed cycle, tagged with the ticket it was started under.
pub struct CycleResult {
    pub ticket: Ticket,
    /// `None` when the image could not be decoded.
    pub payload: Option<ImagePayload>,
    pub outcome: CycleOutcome,
}

/// Run one inference on already encoded bytes.
pub fn run_cycle(service: &dyn DetectionService, encoded: &str) -> CycleOutcome {
    match service.detect(encoded) {
        Ok(detections) => {
            log::info!(
                "{}: {} detection(s)",
                service.name(),
                detections.len()
            );
            CycleOutcome::success(detections)
        }
        Err(err) => {
            log::warn!("{}: detection failed: {:#}", service.name(), err);
            CycleOutcome::failure(&err)
        }
    }
}

/// Run inference for `input`, then wait for its decode to finish.
///
/// Inference starts on the encoded bytes right away; a pending decode runs
/// alongside it.
pub fn run_input(
    service: &dyn DetectionService,
    input: CaptureInput,
) -> (Option<ImagePayload>, CycleOutcome) {
    let outcome = run_cycle(service, input.encoded());
    match input.into_payload() {
        Ok(payload) => (Some(payload), outcome),
        Err(err) => {
            log::warn!("image decode failed: {:#}", err);
            (None, CycleOutcome::failure(&err))
        }
    }
}

/// Run a cycle on a worker thread and send the result through `tx`.
pub fn spawn_cycle<T>(
    service: Arc<dyn DetectionService>,
    ticket: Ticket,
    input: CaptureInput,
    tx: Sender<T>,
) -> Result<()>
where
    T: From<CycleResult> + Send + 'static,
{
    thread::Builder::new()
        .name("bioscan-cycle".to_string())
        .spawn(move || {
            let (payload, outcome) = run_input(service.as_ref(), input);
            let result = CycleResult {
                ticket,
                payload,
                outcome,
            };
            if tx.send(T::from(result)).is_err() {
                log::debug!("cycle finished after its receiver was dropped");
            }
        })
        .context("spawn detection cycle thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ScanSession;
    use anyhow::anyhow;
    use std::sync::mpsc;

    struct FixedService(Result<Vec<Detection>, String>);

    impl DetectionService for FixedService {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _encoded: &str) -> Result<Vec<Detection>> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn glass() -> Detection {
        Detection {
            class_label: "Glass".to_string(),
            confidence: 0.873,
            center_x: 400.0,
            center_y: 300.0,
            width: 100.0,
            height: 50.0,
        }
    }

    fn png_payload() -> Result<ImagePayload> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
            .write_to(&mut bytes, image::ImageFormat::Png)?;
        ImagePayload::from_encoded_bytes(bytes.get_ref())
    }

    #[test]
    fn successful_cycle_formats_report() {
        let outcome = run_cycle(&FixedService(Ok(vec![glass()])), "aGVsbG8=");
        assert!(!outcome.failed);
        assert_eq!(outcome.detections, vec![glass()]);
        assert!(outcome.report.starts_with("Detection 1:\nClass: Glass"));
    }

    #[test]
    fn failed_cycle_clears_detections() {
        let outcome = run_cycle(&FixedService(Err("network down".to_string())), "aGVsbG8=");
        assert!(outcome.failed);
        assert!(outcome.detections.is_empty());
        assert_eq!(outcome.report, "Error: network down");
    }

    #[test]
    fn spawned_cycle_reports_back_with_its_ticket() -> Result<()> {
        let mut session = ScanSession::new();
        session.enter_upload()?;
        let ticket = session.begin_detection()?;

        let (tx, rx) = mpsc::channel::<CycleResult>();
        let service: Arc<dyn DetectionService> = Arc::new(FixedService(Ok(Vec::new())));
        spawn_cycle(service, ticket, CaptureInput::from(png_payload()?), tx)?;

        let result = rx.recv()?;
        assert_eq!(result.ticket, ticket);
        assert!(result.payload.is_some());
        assert_eq!(result.outcome.report, "No biomedical waste detected.");
        assert!(session.complete(result.ticket, result.outcome));
        Ok(())
    }
}
