//! Image workflows
//!
//! - [`ImageFinderWorkflow`]: perpetual loop that discovers an image, hands it
//!   to a processing child and recycles itself
//! - [`ImageProcessingWorkflow`]: downloads and checksums one image inside a
//!   session so both steps run on the same worker

mod finder;
mod processing;

pub use finder::{ImageFinderWorkflow, FINDER_WORKFLOW_ID};
pub use processing::{ImageProcessingInput, ImageProcessingOutput, ImageProcessingWorkflow};
