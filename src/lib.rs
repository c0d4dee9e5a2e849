//! BioScan
//!
//! Biomedical waste detection client. An image comes from a file or a live
//! camera, goes to a hosted object-detection endpoint, and comes back as
//! bounding boxes drawn over the image plus a disposal-bin recommendation for
//! every detected class.
//!
//! # Module Structure
//!
//! - `capture`: file and camera capture adapters producing `ImagePayload`s
//! - `detect`: `Detection` model and the hosted inference client
//! - `overlay`: box/label rendering onto a `Surface` in natural pixel space
//! - `report` / `bins`: textual report and the static bin table
//! - `session` / `pipeline`: screen state, tickets, and one-shot detection cycles
//! - `config`: file + environment configuration

pub mod bins;
pub mod capture;
pub mod config;
pub mod detect;
pub mod overlay;
pub mod payload;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod ui;

pub use bins::{bin_for, UNKNOWN_WASTE_TYPE};
pub use capture::{CameraConfig, CameraSession, FacingMode, FileCapture, PendingPayload};
pub use config::{BioscanConfig, ConfigOverrides};
pub use detect::{BoxRect, Detection, DetectionService, HostedInferenceClient, InferenceSettings};
pub use overlay::{OverlayRenderer, OverlayStyle, RasterSurface, Surface};
pub use payload::ImagePayload;
pub use pipeline::{run_cycle, run_input, spawn_cycle, CaptureInput, CycleOutcome, CycleResult};
pub use report::{error_report, format_report, NO_WASTE_DETECTED};
pub use session::{Mode, Phase, ScanSession, Ticket};
