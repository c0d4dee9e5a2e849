//! bioscan - detect biomedical waste in a photo or camera frame
//!
//! Screens:
//! 1. menu: choose upload or realtime
//! 2. upload: enter an image path, get boxes + bin guidance
//! 3. realtime: capture stills from the front/back camera
//!
//! Annotated images are written to the configured output directory.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use bioscan::ui::{Ui, UiMode};
use bioscan::{
    run_input, spawn_cycle, BioscanConfig, CameraSession, CaptureInput, ConfigOverrides,
    CycleResult, DetectionService, FacingMode, FileCapture, HostedInferenceClient, Mode,
    OverlayRenderer, Phase, RasterSurface, ScanSession,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect biomedical waste in a photo or camera frame and suggest a disposal bin"
)]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "BIOSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Inference endpoint URL (overrides config and BIOSCAN_ENDPOINT).
    #[arg(long)]
    endpoint: Option<String>,

    /// Inference API key (overrides config and BIOSCAN_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Directory for annotated images.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Progress display.
    #[arg(long, value_enum)]
    ui: Option<UiMode>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive menu (default).
    Menu,
    /// Run detection on one image file.
    Upload {
        /// Image file (JPEG/PNG).
        file: PathBuf,
    },
    /// Interactive camera capture.
    Realtime {
        /// Camera to start with: user (front) or environment (back).
        #[arg(long)]
        facing: Option<FacingMode>,
    },
}

/// Everything the main loop reacts to.
enum Event {
    Line(String),
    Eof,
    Finished(CycleResult),
}

impl From<CycleResult> for Event {
    fn from(result: CycleResult) -> Self {
        Event::Finished(result)
    }
}

struct App {
    cfg: BioscanConfig,
    service: Arc<dyn DetectionService>,
    renderer: OverlayRenderer,
    surface: RasterSurface,
    session: ScanSession,
    ui: Ui,
    saved: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let overrides = ConfigOverrides {
        endpoint: args.endpoint.clone(),
        api_key: args.api_key.clone(),
        output_dir: args.output_dir.clone(),
    };
    let cfg = BioscanConfig::load_with(args.config.as_deref(), &overrides)?;
    let ui = Ui::from_args(args.ui, io::stderr().is_terminal());
    let mut app = App::new(cfg, ui)?;

    match args.command.unwrap_or(Command::Menu) {
        Command::Menu => app.interactive(false),
        Command::Upload { file } => app.upload_once(&file),
        Command::Realtime { facing } => {
            let facing = facing.unwrap_or(app.cfg.default_facing);
            app.open_realtime(facing)?;
            app.interactive(true)
        }
    }
}

impl App {
    fn new(cfg: BioscanConfig, ui: Ui) -> Result<Self> {
        let client = HostedInferenceClient::new(cfg.inference.clone())?;
        log::info!("inference endpoint: {}", client.endpoint());
        let font = match &cfg.overlay.font_path {
            Some(path) => Some(RasterSurface::load_font(path)?),
            None => None,
        };
        Ok(Self {
            renderer: OverlayRenderer::new(cfg.overlay.style()?),
            surface: RasterSurface::new(font),
            service: Arc::new(client),
            session: ScanSession::new(),
            cfg,
            ui,
            saved: 0,
        })
    }

    fn upload_once(&mut self, file: &Path) -> Result<()> {
        self.session.enter_upload()?;
        let pending = FileCapture::load(Some(file))?;
        let ticket = self.session.begin_detection()?;
        let (payload, outcome) = {
            let _stage = self.ui.stage("Detecting");
            run_input(self.service.as_ref(), CaptureInput::from(pending))
        };
        self.apply(CycleResult {
            ticket,
            payload,
            outcome,
        })?;
        if self.session.phase() == Phase::Error {
            return Err(anyhow!("detection failed for {}", file.display()));
        }
        Ok(())
    }

    fn open_realtime(&mut self, facing: FacingMode) -> Result<()> {
        let camera = CameraSession::open(self.cfg.camera.clone(), facing)?;
        self.session.enter_realtime(camera)
    }

    /// Main loop. With `exit_on_back`, leaving a screen quits instead of
    /// returning to the menu.
    fn interactive(&mut self, exit_on_back: bool) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        spawn_stdin_reader(tx.clone())?;
        self.prompt();
        self.event_loop(&tx, &rx, exit_on_back)
    }

    fn event_loop(
        &mut self,
        tx: &Sender<Event>,
        rx: &Receiver<Event>,
        exit_on_back: bool,
    ) -> Result<()> {
        while let Ok(event) = rx.recv() {
            match event {
                Event::Finished(result) => {
                    if let Err(err) = self.apply(result) {
                        self.ui.notice(&format!("could not save overlay: {:#}", err));
                    }
                }
                Event::Eof => break,
                Event::Line(line) => {
                    let line = line.trim();
                    let keep_going = match self.session.mode() {
                        Mode::Menu => self.on_menu(line),
                        Mode::Upload => self.on_upload(line, tx, exit_on_back),
                        Mode::Realtime => self.on_realtime(line, tx, exit_on_back),
                    };
                    if !keep_going {
                        break;
                    }
                }
            }
            self.prompt();
        }
        self.session.back();
        Ok(())
    }

    fn on_menu(&mut self, line: &str) -> bool {
        match line {
            "u" | "upload" => {
                if let Err(err) = self.session.enter_upload() {
                    self.ui.notice(&format!("{:#}", err));
                }
            }
            "r" | "realtime" => {
                let facing = self.cfg.default_facing;
                if let Err(err) = self.open_realtime(facing) {
                    self.ui.notice(&format!("{:#}", err));
                }
            }
            "q" | "quit" => return false,
            "" => {}
            other => self.ui.notice(&format!("unknown choice '{}'", other)),
        }
        true
    }

    fn on_upload(&mut self, line: &str, tx: &Sender<Event>, exit_on_back: bool) -> bool {
        if line == "b" || line == "back" {
            self.session.back();
            return !exit_on_back;
        }
        let path = Path::new(line);
        match FileCapture::load(Some(path)) {
            Ok(pending) => self.start_cycle(CaptureInput::from(pending), tx),
            Err(err) => self.session.input_error(format!("{:#}", err)),
        }
        self.show_message();
        true
    }

    fn on_realtime(&mut self, line: &str, tx: &Sender<Event>, exit_on_back: bool) -> bool {
        match line {
            "b" | "back" => {
                self.session.back();
                return !exit_on_back;
            }
            "f" | "flip" => {
                if let Some(camera) = self.session.camera_mut() {
                    match camera.switch_facing() {
                        Ok(facing) => self.ui.notice(&format!("using {}", facing.camera_name())),
                        Err(err) => self.ui.notice(&format!("{:#}", err)),
                    }
                }
            }
            "c" | "capture" => {
                let captured = match self.session.camera_mut() {
                    Some(camera) => camera.capture(),
                    None => Err(anyhow!("camera is not streaming")),
                };
                match captured {
                    Ok(payload) => self.start_cycle(CaptureInput::from(payload), tx),
                    Err(err) => self.session.input_error(format!("{:#}", err)),
                }
                self.show_message();
            }
            "" => {}
            other => self.ui.notice(&format!("unknown command '{}'", other)),
        }
        true
    }

    fn start_cycle(&mut self, input: CaptureInput, tx: &Sender<Event>) {
        let started = self
            .session
            .begin_detection()
            .and_then(|ticket| spawn_cycle(self.service.clone(), ticket, input, tx.clone()));
        if let Err(err) = started {
            self.session.input_error(format!("{:#}", err));
        }
    }

    /// Apply a finished cycle if it is still current, then show and save it.
    fn apply(&mut self, result: CycleResult) -> Result<()> {
        let CycleResult {
            ticket,
            payload,
            outcome,
        } = result;
        if !self.session.complete(ticket, outcome) {
            return Ok(());
        }
        if let Some(message) = self.session.message() {
            self.ui.result_box(message);
        }
        if self.session.phase() != Phase::Result {
            return Ok(());
        }
        let Some(payload) = payload else {
            return Ok(());
        };
        self.renderer.render(
            self.session.detections(),
            &mut self.surface,
            payload.natural_width(),
            payload.natural_height(),
        );
        let annotated = self.surface.compose(&payload)?;
        std::fs::create_dir_all(&self.cfg.output_dir).with_context(|| {
            format!("create output directory {}", self.cfg.output_dir.display())
        })?;
        self.saved += 1;
        let mode = match self.session.mode() {
            Mode::Realtime => "realtime",
            _ => "upload",
        };
        let path = self
            .cfg
            .output_dir
            .join(format!("bioscan_{}_{:04}.png", mode, self.saved));
        annotated
            .save(&path)
            .with_context(|| format!("write {}", path.display()))?;
        self.ui.notice(&format!("annotated image: {}", path.display()));
        Ok(())
    }

    fn show_message(&self) {
        if let Some(message) = self.session.message() {
            self.ui.notice(message);
        }
    }

    fn prompt(&self) {
        let text = match self.session.mode() {
            Mode::Menu => "BioScan: [u]pload, [r]ealtime, [q]uit".to_string(),
            Mode::Upload => "Upload: image path, or [b]ack".to_string(),
            Mode::Realtime => {
                let facing = self
                    .session
                    .camera_facing()
                    .map(|facing| facing.toggled().camera_name())
                    .unwrap_or("camera");
                format!("Realtime: [c]apture & detect, [f] switch to {}, [b]ack", facing)
            }
        };
        eprint!("{}\n> ", text);
        let _ = io::stderr().flush();
    }
}

fn spawn_stdin_reader(tx: Sender<Event>) -> Result<()> {
    thread::Builder::new()
        .name("bioscan-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Event::Eof);
        })
        .context("spawn stdin reader")?;
    Ok(())
}
