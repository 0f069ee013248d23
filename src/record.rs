use crate::state::Pose;
use image::RgbImage;

/// A photograph together with the pose it was taken from.
///
/// The record owns the pixel buffer until [`ImageRecord::into_parts`] hands it downstream.
#[derive(Clone, Debug)]
pub struct ImageRecord {
    filename: String,
    image: RgbImage,
    pose: Pose,
}

impl ImageRecord {
    pub fn new(filename: impl Into<String>, image: RgbImage, pose: Pose) -> Self {
        Self {
            filename: filename.into(),
            image,
            pose,
        }
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

    /// Returns `(width, height)` of the photograph in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn into_parts(self) -> (String, RgbImage, Pose) {
        (self.filename, self.image, self.pose)
    }
}
