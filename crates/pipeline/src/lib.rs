//! Photo processing engine boundary and the bundled `image`-based engine.
//!
//! The job service only talks to [`ProcessingEngine`]; everything about
//! pixels lives behind it.

pub mod engine;
pub mod image_engine;
pub mod layout;

pub use engine::{
    BatchObserver, BatchRequest, EngineError, InputFailure, InputOutcome, ProcessError,
    ProcessingEngine,
};
pub use image_engine::{probe_image, ImageEngine};
