//! Batch de-rotation of loaded photographs.
//!
//! Every record goes through the same steps: attitude to de-rotation matrix, then a padded
//! perspective warp. Records are independent and processed as a rayon data-parallel map. The
//! output keeps telemetry row order so that stitching can correlate results positionally.

use crate::{
    error::{Error, Result},
    record::ImageRecord,
    rotation::derotation,
    state::Pose,
    transform::Homography,
    warp::{CanvasBounds, DEFAULT_MAX_CANVAS_DIMENSION, Interpolation, PerspectiveWarper, Warped},
};
use image::RgbImage;
use rayon::{ThreadPoolBuilder, prelude::*};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What to do when one photograph cannot be corrected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailurePolicy {
    /// Abort the batch with the failing item's error.
    #[default]
    FailFast,
    /// Leave the item out of the output and report it in [`BatchReport::failures`].
    SkipAndRecord,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    pub interpolation: Interpolation,
    pub max_canvas_dimension: u32,
    /// Worker count for a dedicated pool. `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            interpolation: Interpolation::default(),
            max_canvas_dimension: DEFAULT_MAX_CANVAS_DIMENSION,
            threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    failure_policy: Option<FailurePolicy>,
    interpolation: Option<Interpolation>,
    max_canvas_dimension: Option<u32>,
    threads: Option<Option<usize>>,
}

impl PipelineConfigBuilder {
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = Some(interpolation);
        self
    }

    pub fn max_canvas_dimension(mut self, max: u32) -> Self {
        self.max_canvas_dimension = Some(max);
        self
    }

    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        PipelineConfig {
            failure_policy: self.failure_policy.unwrap_or(default.failure_policy),
            interpolation: self.interpolation.unwrap_or(default.interpolation),
            max_canvas_dimension: self
                .max_canvas_dimension
                .unwrap_or(default.max_canvas_dimension),
            threads: self.threads.unwrap_or(default.threads),
        }
    }
}

/// A photograph after de-rotation, with the pose it was taken from.
#[derive(Clone, Debug)]
pub struct CorrectedImage {
    index: usize,
    filename: String,
    image: RgbImage,
    pose: Pose,
    bounds: CanvasBounds,
    derotation: Homography,
    transform: Homography,
}

impl CorrectedImage {
    /// Position of the source row among the telemetry rows, starting at zero.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn bounds(&self) -> &CanvasBounds {
        &self.bounds
    }

    /// The de-rotation matrix `M` computed from the pose.
    pub fn derotation(&self) -> &Homography {
        &self.derotation
    }

    /// The transform actually applied to the source pixels, `T · M`.
    pub fn transform(&self) -> &Homography {
        &self.transform
    }

    /// Hand the corrected image and its pose to the next stage.
    pub fn into_parts(self) -> (RgbImage, Pose) {
        (self.image, self.pose)
    }
}

/// A photograph that could not be corrected.
#[derive(Debug)]
pub struct FailedItem {
    pub index: usize,
    pub filename: String,
    pub error: Error,
}

impl From<FailedItem> for Error {
    fn from(item: FailedItem) -> Self {
        Error::Item {
            index: item.index,
            filename: item.filename,
            source: Box::new(item.error),
        }
    }
}

/// Outcome of [`Pipeline::run`]. Both lists are in telemetry row order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub corrected: Vec<CorrectedImage>,
    pub failures: Vec<FailedItem>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    warper: PerspectiveWarper,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let warper = PerspectiveWarper::new(config.interpolation, config.max_canvas_dimension);
        Self { config, warper }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn warper(&self) -> &PerspectiveWarper {
        &self.warper
    }

    /// De-rotate a single photograph.
    pub fn correct(&self, record: &ImageRecord) -> Result<(Homography, Warped)> {
        let m = derotation(record.pose().attitude())?;
        let warped = self.warper.warp_with_padding(record.image(), &m)?;
        Ok((m, warped))
    }

    /// De-rotate every record, keeping input order.
    ///
    /// Under [`FailurePolicy::FailFast`] the first failure observed aborts the batch and is
    /// returned as [`Error::Item`]. Which failure that is among several is not specified.
    pub fn run(&self, records: Vec<ImageRecord>) -> Result<BatchReport> {
        let total = records.len();
        info!(
            "correcting {total} images ({:?}, {:?})",
            self.config.failure_policy, self.config.interpolation
        );

        let process = || self.process(records);
        let report = match self.config.threads {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(process)?,
            None => process()?,
        };

        info!(
            "corrected {} of {total} images, {} skipped",
            report.corrected.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn process(&self, records: Vec<ImageRecord>) -> Result<BatchReport> {
        let outcomes = records
            .into_par_iter()
            .enumerate()
            .map(|(index, record)| self.correct_item(index, record));

        match self.config.failure_policy {
            FailurePolicy::FailFast => {
                let corrected = outcomes
                    .map(|outcome| outcome.map_err(Error::from))
                    .collect::<Result<Vec<_>>>()?;

                Ok(BatchReport {
                    corrected,
                    failures: Vec::new(),
                })
            }
            FailurePolicy::SkipAndRecord => {
                let mut report = BatchReport::default();
                for outcome in outcomes.collect::<Vec<_>>() {
                    match outcome {
                        Ok(corrected) => report.corrected.push(corrected),
                        Err(failed) => {
                            warn!(
                                "skipping image {} ({}): {}",
                                failed.index, failed.filename, failed.error
                            );
                            report.failures.push(failed);
                        }
                    }
                }
                Ok(report)
            }
        }
    }

    fn correct_item(
        &self,
        index: usize,
        record: ImageRecord,
    ) -> std::result::Result<CorrectedImage, FailedItem> {
        match self.correct(&record) {
            Ok((derotation, warped)) => {
                let (filename, _, pose) = record.into_parts();
                debug!("corrected {filename} onto {:?}", warped.bounds());

                let bounds = *warped.bounds();
                let transform = *warped.transform();
                Ok(CorrectedImage {
                    index,
                    filename,
                    image: warped.into_image(),
                    pose,
                    bounds,
                    derotation,
                    transform,
                })
            }
            Err(error) => Err(FailedItem {
                index,
                filename: record.filename().to_string(),
                error,
            }),
        }
    }
}
