use crate::analyzer::Analyzer;
use crate::composite::ColumnCompositor;
use crate::config::{Settings, MAX_RASTER_CELLS};
use crate::decoder::{Decoder, DecoderBackend};
use crate::error::VisError;
use crate::raster::SharedRaster;
use crate::scale::ScaleMapper;
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

// Granularity of cancellation checks while waiting on the decoder or settling.
const WAIT_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    WaitingForStream,
    Sizing,
    Rendering,
    Cancelled,
    Completed,
    Failed,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::WaitingForStream => "waiting for stream",
            Self::Sizing => "sizing",
            Self::Rendering => "rendering",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// How a run ended. Cancellation is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(VisError),
}

impl Outcome {
    pub fn state(&self) -> EngineState {
        match self {
            Self::Completed => EngineState::Completed,
            Self::Cancelled => EngineState::Cancelled,
            Self::Failed(_) => EngineState::Failed,
        }
    }
}

/// Cooperative cancellation flag owned per session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Engine state plus the error carried by `Failed`, readable from any thread.
#[derive(Debug)]
pub struct EngineStatus {
    inner: Mutex<(EngineState, Option<VisError>)>,
}

impl EngineStatus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((EngineState::Uninitialized, None)),
        }
    }

    pub fn state(&self) -> EngineState {
        self.lock().0
    }

    pub fn failure(&self) -> Option<VisError> {
        self.lock().1.clone()
    }

    /// Terminal states are final; later transitions are ignored.
    fn transition(&self, next: EngineState) -> bool {
        let mut st = self.lock();
        if st.0.is_terminal() {
            return false;
        }
        debug!("engine: {} -> {}", st.0.label(), next.label());
        st.0 = next;
        true
    }

    pub(crate) fn finish(&self, outcome: &Outcome) {
        let mut st = self.lock();
        if st.0.is_terminal() {
            return;
        }
        st.0 = outcome.state();
        if let Outcome::Failed(err) = outcome {
            st.1 = Some(err.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, (EngineState, Option<VisError>)> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self::new()
    }
}

enum Flow {
    Done,
    Cancelled,
}

/// The producer: opens the stream, sizes the raster, then analyses and publishes
/// one column per `step` frames until done, cancelled or failed.
pub struct VisualizationEngine {
    settings: Settings,
    backend: Box<dyn DecoderBackend>,
    analyzer: Box<dyn Analyzer>,
    raster: Arc<SharedRaster>,
    status: Arc<EngineStatus>,
    cancel: CancelToken,
}

impl VisualizationEngine {
    pub fn new(
        settings: Settings,
        backend: Box<dyn DecoderBackend>,
        analyzer: Box<dyn Analyzer>,
        raster: Arc<SharedRaster>,
        status: Arc<EngineStatus>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            settings,
            backend,
            analyzer,
            raster,
            status,
            cancel,
        }
    }

    /// Runs to a terminal state. A panic in a collaborator is caught and
    /// reported as `Failed`, so consumers always see the run end.
    pub fn run(mut self, path: &Path) -> Outcome {
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.render(path)));
        let outcome = match rendered {
            Ok(Ok(Flow::Done)) => Outcome::Completed,
            Ok(Ok(Flow::Cancelled)) => Outcome::Cancelled,
            Ok(Err(err)) => Outcome::Failed(err),
            Err(payload) => Outcome::Failed(VisError::Analyzer(format!(
                "render thread panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match &outcome {
            Outcome::Completed => info!(
                "{}: completed ({} columns)",
                path.display(),
                self.raster.columns_published()
            ),
            Outcome::Cancelled => info!(
                "{}: cancelled after {} columns",
                path.display(),
                self.raster.columns_published()
            ),
            Outcome::Failed(err) => error!("{}: {err}", path.display()),
        }

        self.status.finish(&outcome);
        self.raster.close();
        outcome
    }

    fn render(&mut self, path: &Path) -> Result<Flow, VisError> {
        self.settings.validate()?;

        self.status.transition(EngineState::WaitingForStream);
        let mut decoder = self.backend.open(path, self.settings.sample_rate)?;
        let Some(duration) = self.await_duration(&*decoder)? else {
            return Ok(Flow::Cancelled);
        };
        if !self.pause(self.settings.settle_delay()) {
            return Ok(Flow::Cancelled);
        }

        self.status.transition(EngineState::Sizing);
        let mapper = ScaleMapper::from_settings(&self.settings);
        let height = self.settings.height;
        let width = mapper.columns_for(duration);
        if !width.is_finite() || width < 1.0 || width * height as f64 > MAX_RASTER_CELLS as f64 {
            return Err(VisError::DegenerateSize { duration, width });
        }
        let width = width as usize;
        if !self.raster.allocate(width, height) {
            return Err(VisError::InvalidSettings("raster was already sized".into()));
        }
        info!(
            "{}: {duration:.2}s -> {width}x{height} raster (step {})",
            path.display(),
            self.settings.step
        );

        self.status.transition(EngineState::Rendering);
        let compositor =
            ColumnCompositor::new(mapper, self.settings.calibration(), self.settings.max_tones);
        let step = self.settings.step;
        let mut mono = Vec::with_capacity(step);

        for x in 0..width {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            let frames = decoder.read_samples(step, x * step)?;
            if frames.len() < step * 2 {
                return Err(VisError::StreamRead(format!(
                    "short read at column {x}: {} of {} samples",
                    frames.len(),
                    step * 2
                )));
            }

            // Left channel only.
            mono.clear();
            mono.extend(frames.iter().step_by(2).take(step));

            self.analyzer.input(&mono);
            self.analyzer.process()?;
            let column = compositor.composite(self.analyzer.peaks(), self.analyzer.tones());

            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            if !self.raster.publish_column(x, &column) {
                return Err(VisError::InvalidSettings(format!(
                    "raster rejected column {x} ({} rows)",
                    column.len()
                )));
            }
        }

        Ok(Flow::Done)
    }

    /// Bounded wait for the decoder to report a duration. `Ok(None)` on cancel.
    fn await_duration(&self, decoder: &dyn Decoder) -> Result<Option<f64>, VisError> {
        let timeout = self.settings.ready_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(VisError::StreamOpen(format!(
                    "no duration reported within {} ms",
                    timeout.as_millis()
                )));
            }
            if let Some(d) = decoder.wait_for_duration(WAIT_SLICE.min(deadline - now))? {
                debug!("stream duration {d:.3}s");
                return Ok(Some(d));
            }
        }
    }

    /// Sleeps for `total`, returning false early if cancelled.
    fn pause(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string payload"
    }
}
