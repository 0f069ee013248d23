use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use nadir::{logger, prelude::*, warp::DEFAULT_MAX_CANVAS_DIMENSION};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// Stop at the first photograph that cannot be corrected.
    FailFast,
    /// Correct what can be corrected and list the rest.
    Skip,
}

impl From<Policy> for FailurePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::FailFast => FailurePolicy::FailFast,
            Policy::Skip => FailurePolicy::SkipAndRecord,
        }
    }
}

/// De-rotate drone photographs so that they look as if taken straight down.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Telemetry file with one `filename,v1,...,v6` row per photograph.
    #[arg(long)]
    telemetry: PathBuf,

    /// Directory holding the photographs named in the telemetry.
    #[arg(long)]
    images: PathBuf,

    /// Directory that receives corrected photographs and `poses.csv`.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Policy::FailFast)]
    policy: Policy,

    /// Sample with nearest neighbour instead of bilinear interpolation.
    #[arg(long)]
    nearest: bool,

    /// Worker threads. Defaults to one per core.
    #[arg(long)]
    threads: Option<usize>,

    /// Largest corrected image side in pixels. The altitude field lands in the roll slot, so
    /// a large altitude stretches photographs far beyond their size; raise this if such
    /// photographs are rejected as invalid transforms.
    #[arg(long, default_value_t = DEFAULT_MAX_CANVAS_DIMENSION)]
    max_canvas: u32,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(&args.log);

    let records = TelemetryLoader::new(&args.images)
        .load(&args.telemetry)
        .with_context(|| format!("loading {}", args.telemetry.display()))?;

    let config = PipelineConfig::builder()
        .failure_policy(args.policy.into())
        .interpolation(match args.nearest {
            true => Interpolation::Nearest,
            false => Interpolation::Bilinear,
        })
        .max_canvas_dimension(args.max_canvas)
        .threads(args.threads)
        .build();
    let report = Pipeline::new(config).run(records)?;

    let paths = report
        .corrected
        .iter()
        .map(|corrected| output_path(&args.output, corrected.filename()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    report
        .corrected
        .par_iter()
        .zip(&paths)
        .try_for_each(|(corrected, path)| save_image(path, corrected))?;
    write_poses(&args.output.join("poses.csv"), &report.corrected)?;

    info!(
        "wrote {} images to {}",
        report.corrected.len(),
        args.output.display()
    );

    for failed in &report.failures {
        error!("{} (row {}): {}", failed.filename, failed.index, failed.error);
    }
    if !report.is_complete() {
        bail!("{} images could not be corrected", report.failures.len());
    }

    Ok(())
}

/// Location of a corrected image inside `output_dir`.
///
/// Only relative filenames made of plain components are accepted.
fn output_path(output_dir: &Path, filename: &str) -> anyhow::Result<PathBuf> {
    let relative = Path::new(filename);
    let plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !plain || relative.as_os_str().is_empty() {
        bail!(
            "refusing to write {filename:?} outside {}",
            output_dir.display()
        );
    }

    Ok(output_dir.join(relative))
}

fn save_image(path: &Path, corrected: &CorrectedImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    corrected
        .image()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

fn write_poses(path: &Path, corrected: &[CorrectedImage]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut output = BufWriter::new(file);

    writeln!(output, "filename,x_km,y_km,z_km,a_deg,b_deg,c_deg")?;
    for item in corrected {
        let [x, y, z, a, b, c] = item.pose().to_array();
        writeln!(
            output,
            "{},{x:.6},{y:.6},{z:.6},{a:.6},{b:.6},{c:.6}",
            item.filename()
        )?;
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("img001.jpg", "out/img001.jpg")]
    #[case("flight2/img001.jpg", "out/flight2/img001.jpg")]
    fn output_path_stays_inside(#[case] filename: &str, #[case] expected: &str) {
        assert_eq!(
            output_path(Path::new("out"), filename).unwrap(),
            PathBuf::from(expected)
        );
    }

    #[rstest]
    #[case("../img001.jpg")]
    #[case("flight2/../../img001.jpg")]
    #[case("/tmp/img001.jpg")]
    #[case("./img001.jpg")]
    fn output_path_rejects_escapes(#[case] filename: &str) {
        let err = output_path(Path::new("out"), filename).unwrap_err();
        assert!(err.to_string().starts_with("refusing to write"), "{err}");
    }
}
