//! Nadir correction for drone photographs.
//!
//! Loads per-image telemetry and photographs, converts geodetic positions to Earth-centered
//! Cartesian coordinates and warps every photograph so that it looks as if it had been taken
//! straight down. The outputs are ordered `(image, pose)` pairs ready for mosaic stitching.
//!
//! ```no_run
//! use nadir::prelude::*;
//!
//! # fn main() -> nadir::error::Result<()> {
//! let records = TelemetryLoader::new("flight/images").load("flight/telemetry.csv")?;
//! let report = Pipeline::default().run(records)?;
//! for corrected in report.corrected {
//!     let (_image, pose) = corrected.into_parts();
//!     println!("{:?}", pose.to_array());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logger;
pub mod pipeline;
pub mod record;
pub mod rotation;
pub mod state;
pub mod telemetry;
pub mod transform;
pub mod warp;

pub mod prelude {
    pub use crate::{
        error::{Error, LoadError},
        pipeline::{BatchReport, CorrectedImage, FailurePolicy, Pipeline, PipelineConfig},
        record::ImageRecord,
        rotation::{RotationMatrix, derotation},
        state::{Attitude, Cartesian, Pose, Position},
        telemetry::{TelemetryLoader, TelemetryRow},
        transform::Homography,
        warp::{CanvasBounds, Interpolation, PerspectiveWarper},
    };
}
