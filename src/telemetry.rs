//! Telemetry rows and the photographs they reference.
//!
//! Each row of a telemetry file names one photograph followed by six numbers:
//!
//! ```text
//! <filename>,<v1>,<v2>,<v3>,<v4>,<v5>,<v6>
//! ```
//!
//! `v1` and `v2` are latitude and longitude in degrees, `v4` is altitude. Blank lines and
//! anything after a `#` are ignored.

use crate::{
    error::{Error, LoadError, Result},
    record::ImageRecord,
    state::{Attitude, Pose, Position},
};
use image::{ImageReader, RgbImage};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Number of numeric fields following the filename.
pub const FIELD_COUNT: usize = 6;

/// One parsed telemetry row, exactly as it appeared in the input.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRow {
    filename: String,
    values: [f64; FIELD_COUNT],
}

impl TelemetryRow {
    pub fn new(filename: impl Into<String>, values: [f64; FIELD_COUNT]) -> Self {
        Self {
            filename: filename.into(),
            values,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The numeric fields `v1..v6` in input order.
    pub fn values(&self) -> &[f64; FIELD_COUNT] {
        &self.values
    }

    pub fn latitude(&self) -> f64 {
        self.values[0]
    }

    pub fn longitude(&self) -> f64 {
        self.values[1]
    }

    pub fn altitude(&self) -> f64 {
        self.values[3]
    }

    pub fn position(&self) -> Position {
        Position::from_degrees(self.latitude(), self.longitude())
    }

    /// Build the pose `[X, Y, Z, v6, v5, v4]`.
    ///
    /// `v3` is dropped. Altitude (`v4`) lands in the roll slot, which is how downstream
    /// consumers have always received it.
    pub fn pose(&self) -> Pose {
        let [_, _, _, v4, v5, v6] = self.values;
        Pose::new(
            self.position().to_cartesian(),
            Attitude::from_degrees(v6, v5, v4),
        )
    }

    fn into_filename(self) -> String {
        self.filename
    }
}

/// Parse a single telemetry line.
///
/// Returns `Ok(None)` for blank and comment-only lines. `NaN` and infinite fields are rejected.
/// `line` is the 1-based line number used in error messages.
pub fn parse_row(text: &str, line: usize) -> std::result::Result<Option<TelemetryRow>, LoadError> {
    let content = text.split_once('#').map_or(text, |(head, _)| head).trim();
    if content.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = content.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT + 1 {
        return Err(LoadError::Row {
            line,
            reason: format!(
                "expected {} comma-separated fields, found {}",
                FIELD_COUNT + 1,
                fields.len()
            ),
        });
    }

    let filename = fields[0];
    if filename.is_empty() {
        return Err(LoadError::Row {
            line,
            reason: "filename is empty".into(),
        });
    }

    let mut values = [0.0_f64; FIELD_COUNT];
    for (i, (value, field)) in values.iter_mut().zip(&fields[1..]).enumerate() {
        *value = field.parse().map_err(|err| LoadError::Row {
            line,
            reason: format!("v{} {field:?} is not a number: {err}", i + 1),
        })?;
        if !value.is_finite() {
            return Err(LoadError::Row {
                line,
                reason: format!("v{} {field:?} is not finite", i + 1),
            });
        }
    }

    Ok(Some(TelemetryRow::new(filename, values)))
}

/// Parse every row of a telemetry document, preserving order.
pub fn parse_telemetry(text: &str) -> std::result::Result<Vec<TelemetryRow>, LoadError> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| parse_row(line, i + 1).transpose())
        .collect()
}

/// Loads telemetry rows and the photographs they name from an image directory.
#[derive(Clone, Debug)]
pub struct TelemetryLoader {
    image_dir: PathBuf,
}

impl TelemetryLoader {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Path of the photograph named by `row`.
    ///
    /// The filename is joined onto the image directory as written, with no normalization.
    pub fn image_path(&self, row: &TelemetryRow) -> PathBuf {
        self.image_dir.join(row.filename())
    }

    /// Read and parse a telemetry file.
    pub fn read_rows(&self, telemetry: impl AsRef<Path>) -> Result<Vec<TelemetryRow>> {
        let telemetry = telemetry.as_ref();
        let text = fs::read_to_string(telemetry).map_err(|source| LoadError::Io {
            path: telemetry.to_path_buf(),
            source,
        })?;

        let rows = parse_telemetry(&text)?;
        info!("read {} telemetry rows from {}", rows.len(), telemetry.display());
        Ok(rows)
    }

    /// Read a telemetry file and load every photograph it references.
    pub fn load(&self, telemetry: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
        let rows = self.read_rows(telemetry)?;
        self.load_rows(rows)
    }

    /// Load the photograph for each row.
    ///
    /// Images are decoded in parallel. If several are unreadable, the error names the one whose
    /// row comes first.
    pub fn load_rows(&self, rows: Vec<TelemetryRow>) -> Result<Vec<ImageRecord>> {
        let images = rows
            .par_iter()
            .map(|row| self.load_image(row))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, LoadError>>()?;

        info!(
            "loaded {} images from {}",
            images.len(),
            self.image_dir.display()
        );
        Self::pair(rows, images)
    }

    /// Pair rows with already decoded images, in order.
    ///
    /// Fails with [`Error::DimensionMismatch`] if the counts differ.
    pub fn pair(rows: Vec<TelemetryRow>, images: Vec<RgbImage>) -> Result<Vec<ImageRecord>> {
        if rows.len() != images.len() {
            return Err(Error::DimensionMismatch {
                rows: rows.len(),
                images: images.len(),
            });
        }

        Ok(rows
            .into_iter()
            .zip(images)
            .map(|(row, image)| {
                let pose = row.pose();
                ImageRecord::new(row.into_filename(), image, pose)
            })
            .collect())
    }

    fn load_image(&self, row: &TelemetryRow) -> std::result::Result<RgbImage, LoadError> {
        let path = self.image_path(row);
        let image = ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?
            .decode()
            .map_err(|source| LoadError::Image {
                path: path.clone(),
                source,
            })?
            .into_rgb8();

        debug!(
            "decoded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
