use ab_glyph::FontArc;
use anyhow::{Context, Result, anyhow};
use audrex_audio::{ActiveClock, ActivePlayer, BackendPreference, select_backend};
use audrex_cache::AudioCache;
use audrex_core::TrialResult;
use audrex_render::{ButtonPanelRenderer, FrameStats, PanelView};
use audrex_timing::{ClockSource, DeadlineScheduler, WallClock};
use audrex_trial::{TrialConfig, TrialEvent, TrialStateMachine};
use pixels::{Pixels, SurfaceTexture};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type ActiveTrial = TrialStateMachine<ActiveClock, ActivePlayer>;

/// The last stretch of an inter-trial interval is slept precisely instead of
/// left to the event loop's timer.
const ITI_SPIN_MS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum IntervalWait {
    /// Let the event loop idle for this long, then check again.
    Park(Duration),
    /// Sleep the remainder on the precision timer, then start the trial.
    Finish(Duration),
}

fn interval_wait(remaining_ms: f64) -> IntervalWait {
    if remaining_ms > ITI_SPIN_MS {
        IntervalWait::Park(Duration::from_secs_f64((remaining_ms - ITI_SPIN_MS) / 1_000.0))
    } else {
        IntervalWait::Finish(Duration::from_secs_f64(remaining_ms.max(0.0) / 1_000.0))
    }
}

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<ButtonPanelRenderer>,
    font: Option<FontArc>,

    pending: VecDeque<TrialConfig>,
    cache: AudioCache,
    preference: BackendPreference,
    trial: Option<ActiveTrial>,
    trial_index: usize,
    results: Vec<TrialResult>,

    iti: Duration,
    iti_clock: WallClock,
    next_trial_at_ms: Option<f64>,
    out: Option<PathBuf>,
    cursor: PhysicalPosition<f64>,
    refresh_rate: Option<f64>,
    failure: Option<anyhow::Error>,
    should_exit: bool,
}

impl App {
    pub fn new(
        trials: Vec<TrialConfig>,
        cache: AudioCache,
        font: Option<FontArc>,
        preference: BackendPreference,
        iti: Duration,
        out: Option<PathBuf>,
    ) -> Self {
        Self {
            window: None,
            pixels: None,
            renderer: None,
            font,
            pending: trials.into(),
            cache,
            preference,
            trial: None,
            trial_index: 0,
            results: Vec::new(),
            iti,
            iti_clock: WallClock::new(),
            next_trial_at_ms: None,
            out,
            cursor: PhysicalPosition::new(0.0, 0.0),
            refresh_rate: None,
            failure: None,
            should_exit: false,
        }
    }

    /// Runs the timeline to the end (or until Escape), then writes whatever
    /// results were collected.
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            trials = self.pending.len(),
            "starting experiment, ESC to abort"
        );

        let result = event_loop.run_app(&mut self);
        self.write_results()?;

        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        result.map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Audrex")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();

        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);
        self.renderer = Some(ButtonPanelRenderer::new(
            physical_size.width,
            physical_size.height,
            self.font.clone(),
        )?);

        window.request_redraw();
        self.window = Some(window);

        self.start_next_trial()
    }

    /// Pops the next trial and starts it on a freshly selected backend.
    /// Returns without a trial once the timeline is exhausted.
    fn start_next_trial(&mut self) -> Result<()> {
        let Some(config) = self.pending.pop_front() else {
            self.trial = None;
            return Ok(());
        };

        let backend = select_backend(&self.cache, &config.stimulus, self.preference)
            .with_context(|| format!("selecting audio backend for {:?}", config.stimulus))?;
        debug!(index = self.trial_index, clock = ?backend.kind(), "backend selected");

        let trial = TrialStateMachine::start(
            config,
            backend.clock,
            backend.player,
            DeadlineScheduler::new(),
            Vec::new(),
        )
        .with_context(|| format!("starting trial {}", self.trial_index))?;

        self.trial_index += 1;
        self.trial = Some(trial);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pix), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        if let Some(trial) = self.trial.as_mut() {
            trial.poll();
        }

        let buttons = self
            .trial
            .as_ref()
            .map(|t| t.button_markup())
            .unwrap_or_default();
        let view = match &self.trial {
            Some(trial) => PanelView {
                prompt: &trial.config().prompt,
                buttons: &buttons,
                enabled: trial.controls_enabled(),
                margin_vertical: trial.config().margin_vertical,
                margin_horizontal: trial.config().margin_horizontal,
                visible: !trial.is_done(),
            },
            None => PanelView {
                prompt: "",
                buttons: &[],
                enabled: false,
                margin_vertical: 0.0,
                margin_horizontal: 0.0,
                visible: false,
            },
        };

        let stats: FrameStats = renderer.render_frame(&view, pix.frame_mut())?;
        pix.render()?;

        trace!(
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            buttons = stats.buttons,
            "frame"
        );
        Ok(())
    }

    /// Collects a finished trial and arms the inter-trial interval. The
    /// next trial is started from `about_to_wait` once it has elapsed.
    fn advance(&mut self, event_loop: &ActiveEventLoop) {
        if !self.trial.as_ref().is_some_and(|t| t.is_done()) {
            return;
        }
        if let Some(trial) = self.trial.take() {
            self.results.extend(trial.into_sink());
        }

        if self.pending.is_empty() {
            info!(completed = self.results.len(), "timeline finished");
            self.cleanup_and_exit(event_loop);
            return;
        }

        let at_ms = self.iti_clock.now_ms() + self.iti.as_secs_f64() * 1_000.0;
        debug!(iti_ms = self.iti.as_millis() as u64, "inter-trial interval");
        self.next_trial_at_ms = Some(at_ms);
    }

    fn resume_after_interval(&mut self, event_loop: &ActiveEventLoop) {
        let Some(at_ms) = self.next_trial_at_ms else {
            return;
        };
        match interval_wait(at_ms - self.iti_clock.now_ms()) {
            IntervalWait::Park(wait) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + wait));
            }
            IntervalWait::Finish(rest) => {
                self.iti_clock.high_precision_sleep(rest);
                self.next_trial_at_ms = None;
                event_loop.set_control_flow(ControlFlow::Wait);
                if let Err(e) = self.start_next_trial() {
                    self.fail(e, event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
        }
    }

    fn respond(&mut self, choice: usize) {
        if let Some(trial) = self.trial.as_mut() {
            if !trial.handle(TrialEvent::Response { choice }) {
                trace!(choice, "response not accepted");
            }
        }
    }

    fn handle_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let choice = match code {
            KeyCode::Escape => {
                warn!(completed = self.results.len(), "experiment aborted");
                self.cleanup_and_exit(event_loop);
                return;
            }
            KeyCode::Digit1 | KeyCode::Numpad1 => 0,
            KeyCode::Digit2 | KeyCode::Numpad2 => 1,
            KeyCode::Digit3 | KeyCode::Numpad3 => 2,
            KeyCode::Digit4 | KeyCode::Numpad4 => 3,
            KeyCode::Digit5 | KeyCode::Numpad5 => 4,
            KeyCode::Digit6 | KeyCode::Numpad6 => 5,
            KeyCode::Digit7 | KeyCode::Numpad7 => 6,
            KeyCode::Digit8 | KeyCode::Numpad8 => 7,
            KeyCode::Digit9 | KeyCode::Numpad9 => 8,
            _ => return,
        };
        self.respond(choice);
    }

    fn handle_click(&mut self) {
        let hit = self
            .renderer
            .as_ref()
            .and_then(|r| r.hit_test(self.cursor.x as f32, self.cursor.y as f32));
        if let Some(choice) = hit {
            self.respond(choice);
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!("Failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!("Failed to resize buffer: {e}");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!("Failed to resize canvas: {e}");
            }
        }
        debug!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn fail(&mut self, err: anyhow::Error, event_loop: &ActiveEventLoop) {
        error!("{err:#}");
        self.failure = Some(err);
        self.cleanup_and_exit(event_loop);
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        // Dropping the trial stops its stream.
        self.trial = None;
        self.should_exit = true;
        event_loop.exit();
    }

    fn write_results(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.results)?;
        match &self.out {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("writing results to {}", path.display()))?;
                info!(path = %path.display(), trials = self.results.len(), "results saved");
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(e, event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    self.fail(e, event_loop);
                    return;
                }
                self.advance(event_loop);
                if self.trial.is_some() {
                    if let Some(win) = &self.window {
                        win.request_redraw();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor = position,
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
            return;
        }
        self.resume_after_interval(event_loop);
    }
}
