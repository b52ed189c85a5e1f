use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use zlp_stitch::{ExtensionPolicy, FileOrder, Stitcher};

pub struct Options {
    pub order: FileOrder,
    pub time_column: String,
    pub policy: ExtensionPolicy,
    pub statistics: bool,
    pub remove_partial: bool,
    pub exposure: Option<f64>,
}

pub fn stitch(inputs: &[PathBuf], output: &Path, opts: &Options) -> Result<()> {
    info!("stitching {} inputs to {output:?}", inputs.len());
    let report = Stitcher::builder()
        .inputs(inputs.to_vec())
        .output(output)
        .order(opts.order)
        .time_column(opts.time_column.clone())
        .policy(opts.policy.clone())
        .statistics(opts.statistics)
        .remove_partial(opts.remove_partial)
        .exposure(opts.exposure)
        .build()
        .run()
        .with_context(|| format!("stitching {} inputs to {output:?}", inputs.len()))?;

    for (path, frames) in &report.files {
        info!("{path:?}: {frames} frames");
    }
    info!(
        "wrote {} frames x {} apertures, extensions {}",
        report.dimensions.frames,
        report.dimensions.apertures,
        report.extensions.join(",")
    );
    Ok(())
}
