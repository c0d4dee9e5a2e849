//! Screen and detection state for an interactive BioScan session.
//!
//! `menu -> upload | realtime`, each with `idle -> detecting -> (result | error)`,
//! and back to `menu` on an explicit back action.
//!
//! Every detection is started under a `Ticket`. Only the most recently issued
//! ticket may apply its result; anything older is discarded, so a slow response
//! can never overwrite a newer one. Leaving a screen also invalidates tickets.

use anyhow::{anyhow, Result};

use crate::capture::{CameraSession, FacingMode};
use crate::detect::Detection;
use crate::pipeline::CycleOutcome;
use crate::report::DETECTING;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Menu,
    Upload,
    Realtime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Detecting,
    Result,
    Error,
}

/// Identifies one detection request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

pub struct ScanSession {
    mode: Mode,
    phase: Phase,
    generation: u64,
    message: Option<String>,
    detections: Vec<Detection>,
    camera: Option<CameraSession>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            mode: Mode::Menu,
            phase: Phase::Idle,
            generation: 0,
            message: None,
            detections: Vec::new(),
            camera: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Text shown under the image: progress, report, or error.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Detections of the last applied result.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn enter_upload(&mut self) -> Result<()> {
        self.enter(Mode::Upload)
    }

    /// Enter the realtime screen. The session owns `camera` until `back()`.
    pub fn enter_realtime(&mut self, camera: CameraSession) -> Result<()> {
        self.enter(Mode::Realtime)?;
        self.camera = Some(camera);
        Ok(())
    }

    pub fn camera_mut(&mut self) -> Option<&mut CameraSession> {
        self.camera.as_mut()
    }

    pub fn camera_facing(&self) -> Option<FacingMode> {
        self.camera.as_ref().map(|camera| camera.facing())
    }

    /// Return to the menu, releasing the camera and orphaning in-flight work.
    pub fn back(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.close();
        }
        self.generation += 1;
        self.mode = Mode::Menu;
        self.reset();
    }

    /// Start a detection and issue its ticket.
    pub fn begin_detection(&mut self) -> Result<Ticket> {
        if self.mode == Mode::Menu {
            return Err(anyhow!("choose upload or realtime before detecting"));
        }
        self.generation += 1;
        self.phase = Phase::Detecting;
        self.message = Some(DETECTING.to_string());
        self.detections.clear();
        Ok(Ticket {
            generation: self.generation,
        })
    }

    /// Record a user-facing input problem (no file, no camera) and go idle.
    pub fn input_error(&mut self, message: impl Into<String>) {
        self.generation += 1;
        self.phase = Phase::Idle;
        self.message = Some(message.into());
        self.detections.clear();
    }

    /// Apply a finished cycle if `ticket` is still current.
    ///
    /// Returns `false` (and changes nothing) for stale tickets.
    pub fn complete(&mut self, ticket: Ticket, outcome: CycleOutcome) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "discarding stale result (generation {} < {})",
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.phase = if outcome.failed {
            Phase::Error
        } else {
            Phase::Result
        };
        self.message = Some(outcome.report);
        self.detections = outcome.detections;
        true
    }

    /// True if `ticket` was the last one issued and is still awaiting a result.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.phase == Phase::Detecting && ticket.generation == self.generation
    }

    fn enter(&mut self, mode: Mode) -> Result<()> {
        if self.mode != Mode::Menu {
            return Err(anyhow!("already in {:?} mode; go back first", self.mode));
        }
        self.mode = mode;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.message = None;
        self.detections.clear();
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}
