// THEORY:
// This file is the main entry point for the `mmm_vision` library crate.
// It exposes the `VisionPipeline` façade together with the building blocks it
// is made of, so callers can either drive the whole chain frame by frame or
// reach for a single stage (the background model, the density rollers or the
// blob finder) on its own.
//
// Data flows through the stages in a fixed order:
// raw frame -> background model (background blacked out) -> density scanner
// (integer salience map) -> blob extractor (blob records, optional ID map).

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use error::{VisionError, VisionResult};
