use thiserror::Error;

/// Terminal failure of a visualization run.
///
/// Messages are flattened to strings so the value can be stored in the shared
/// session status and cloned out to every consumer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisError {
    #[error("cannot open stream: {0}")]
    StreamOpen(String),
    #[error("cannot read stream: {0}")]
    StreamRead(String),
    #[error("degenerate raster size (duration {duration}s -> {width} columns)")]
    DegenerateSize { duration: f64, width: f64 },
    #[error("analyzer failed: {0}")]
    Analyzer(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AnalyzerError(pub String);

impl From<AnalyzerError> for VisError {
    fn from(err: AnalyzerError) -> Self {
        Self::Analyzer(err.0)
    }
}
