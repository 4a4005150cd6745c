use crate::analyzer::{Analyzer, SpectrumAnalyzer};
use crate::config::{DecoderMode, Settings};
use crate::decoder::{DecoderBackend, WavBackend};
use crate::media::MediaBackend;
use crate::engine::{CancelToken, EngineState, EngineStatus, Outcome, VisualizationEngine};
use crate::error::VisError;
use crate::raster::{RasterSnapshot, SharedRaster};
use crate::scale::ScaleMapper;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One visualization run: a background producer plus the consumer-side view of
/// its raster. Sessions share nothing, so several can run at once.
///
/// Dropping the handle cancels the producer and waits for it to stop.
pub struct PitchVis {
    raster: Arc<SharedRaster>,
    status: Arc<EngineStatus>,
    cancel: CancelToken,
    mapper: ScaleMapper,
    handle: Option<thread::JoinHandle<Outcome>>,
}

impl PitchVis {
    /// Visualizes an audio file with the built-in spectrum analyzer and the
    /// decoder chosen in `settings`.
    pub fn start(path: impl AsRef<Path>, settings: &Settings) -> Result<Self, VisError> {
        let analyzer = SpectrumAnalyzer::with_profile(settings.sample_rate, settings.profile);
        match settings.decoder {
            DecoderMode::Media => Self::start_with(path, settings, MediaBackend, analyzer),
            DecoderMode::Wav => Self::start_with(path, settings, WavBackend, analyzer),
        }
    }

    pub fn start_with<B, A>(
        path: impl AsRef<Path>,
        settings: &Settings,
        backend: B,
        analyzer: A,
    ) -> Result<Self, VisError>
    where
        B: DecoderBackend + 'static,
        A: Analyzer + 'static,
    {
        let raster = Arc::new(SharedRaster::new());
        let status = Arc::new(EngineStatus::new());
        let cancel = CancelToken::new();
        let path: PathBuf = path.as_ref().to_path_buf();

        let engine = VisualizationEngine::new(
            settings.clone(),
            Box::new(backend),
            Box::new(analyzer),
            Arc::clone(&raster),
            Arc::clone(&status),
            cancel.clone(),
        );

        let handle = thread::Builder::new()
            .name("pitchvis-engine".into())
            .spawn(move || engine.run(&path))
            .map_err(|e| VisError::StreamOpen(format!("spawn engine thread: {e}")))?;

        Ok(Self {
            raster,
            status,
            cancel,
            mapper: ScaleMapper::from_settings(settings),
            handle: Some(handle),
        })
    }

    /// Requests cooperative termination; the current column is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.raster.dimensions()
    }

    pub fn read_cell(&self, x: usize, y: usize) -> Option<u32> {
        self.raster.read_cell(x, y)
    }

    pub fn read_snapshot(&self) -> Option<RasterSnapshot> {
        self.raster.read_snapshot()
    }

    pub fn read_columns(&self, columns: Range<usize>) -> Option<RasterSnapshot> {
        self.raster.read_columns(columns)
    }

    /// The newest `count` columns, as a scrolling view shows them.
    pub fn read_tail(&self, count: usize) -> Option<RasterSnapshot> {
        self.raster.read_tail(count)
    }

    pub fn poll_more_available(&self) -> bool {
        self.raster.poll_more_available()
    }

    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        self.raster.wait_for_update(timeout)
    }

    /// `(columns published, width)`; width is 0 until sized.
    pub fn progress(&self) -> (usize, usize) {
        let width = self.dimensions().map_or(0, |(w, _)| w);
        (self.raster.columns_published(), width)
    }

    pub fn state(&self) -> EngineState {
        self.status.state()
    }

    pub fn failure(&self) -> Option<VisError> {
        self.status.failure()
    }

    pub fn scale(&self) -> &ScaleMapper {
        &self.mapper
    }

    pub fn pixel_to_time(&self, x: f64) -> f64 {
        self.mapper.pixel_x_to_time(x)
    }

    pub fn time_to_pixel(&self, t: f64) -> f64 {
        self.mapper.time_to_pixel_x(t)
    }

    pub fn pixel_to_note(&self, y: f64) -> f64 {
        self.mapper.pixel_y_to_note(y)
    }

    pub fn note_to_pixel(&self, note: f64) -> i64 {
        self.mapper.note_to_pixel_y(note)
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Waits for the producer to stop and returns how it ended.
    pub fn join(mut self) -> Outcome {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Outcome {
        let Some(handle) = self.handle.take() else {
            return self.recorded_outcome();
        };
        match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                let outcome = Outcome::Failed(VisError::Analyzer("render thread panicked".into()));
                self.status.finish(&outcome);
                self.raster.close();
                outcome
            }
        }
    }

    fn recorded_outcome(&self) -> Outcome {
        match self.state() {
            EngineState::Completed => Outcome::Completed,
            EngineState::Failed => Outcome::Failed(
                self.failure()
                    .unwrap_or_else(|| VisError::Analyzer("unknown failure".into())),
            ),
            _ => Outcome::Cancelled,
        }
    }
}

impl Drop for PitchVis {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            let _ = self.join_inner();
        }
    }
}
