pub mod analyzer;
pub mod app;
pub mod composite;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod media;
pub mod preview;
pub mod raster;
pub mod render;
pub mod scale;
pub mod session;
pub mod terminal;

pub use engine::{CancelToken, EngineState, Outcome};
pub use error::VisError;
pub use session::PitchVis;
