mod info;
mod resort;
mod stitch;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use zlp_stitch::{DuplicateIndexRule, ExtensionPolicy, FileOrder, DEFAULT_TIME_COLUMN};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch light curve files into a single file.
    ///
    /// Image frames and IMAGELIST rows are concatenated in the order the inputs are
    /// given, unless --sort-by-time is used. The CATALOGUE is copied from the first
    /// input. All inputs must have the same number of apertures. An existing output
    /// is overwritten.
    Stitch {
        /// Process inputs in order of their earliest frame time rather than argument
        /// order.
        #[arg(long, action)]
        sort_by_time: bool,

        /// IMAGELIST column used by --sort-by-time.
        #[arg(long, default_value = DEFAULT_TIME_COLUMN, value_name = "name")]
        time_column: String,

        /// Drop image extensions named <FAMILY>_<n> for these indices.
        ///
        /// This accepts a CSV of indices as well as ranges of the format <start>-<end>
        /// where start and end are inclusive, e.g., --drop-indices 1,3-13. Defaults to
        /// 1-13 with index 2 kept.
        #[arg(long, value_name = "csv", value_delimiter = ',')]
        drop_indices: Vec<String>,

        /// Keep this index even if it is dropped by --drop-indices.
        #[arg(long, value_name = "n")]
        keep_index: Option<u32>,

        /// Keep every image extension.
        #[arg(long, action, conflicts_with_all = ["drop_indices", "keep_index"])]
        keep_all_extensions: bool,

        /// Add NPTS and FLUX_MEAN columns to the output CATALOGUE.
        #[arg(long, action)]
        statistics: bool,

        /// Delete the output if stitching fails part way.
        #[arg(long, action)]
        remove_partial: bool,

        /// Only keep frames whose IMAGELIST EXPOSURE equals this value exactly.
        #[arg(short, long, value_name = "seconds")]
        exptime: Option<f64>,

        /// Output file path.
        #[arg(short, long, value_name = "path")]
        output: PathBuf,

        /// Input light curve files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show information about a light curve file.
    Info {
        /// Input light curve file.
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,
    },
    /// Sort a stitched file by frame time, in place.
    Resort {
        /// Required to actually modify the file.
        #[arg(short, long, action)]
        force: bool,

        /// File to sort.
        file: PathBuf,
    },
}

fn parse_number_ranges(list: &[String]) -> Result<Vec<u32>> {
    let rx = regex::Regex::new(r"^(?:(\d+)|(\d+)-(\d+))$").expect("regex to compile");
    let mut values = Vec::default();
    for (i, s) in list.iter().enumerate() {
        let Some(cap) = rx.captures(s.trim()) else {
            bail!("invalid number or range at {i}: {s}");
        };

        if cap.get(1).is_some() {
            let x = cap[1]
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid number value"))?;
            values.push(x);
        } else {
            let start = cap[2]
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid range value"))?;
            let end = cap[3]
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid range value"))?;
            if start >= end {
                bail!("invalid range {s}")
            }
            values.extend(start..=end);
        }
    }

    Ok(values)
}

fn extension_policy(
    drop_indices: &[String],
    keep_index: Option<u32>,
    keep_all: bool,
) -> Result<ExtensionPolicy> {
    if keep_all {
        return Ok(ExtensionPolicy::keep_all());
    }
    if drop_indices.is_empty() {
        let mut rule = DuplicateIndexRule::default();
        if let Some(keep) = keep_index {
            rule = rule.with_keep(keep);
        }
        return Ok(ExtensionPolicy::keep_all().with_rule(rule));
    }
    let mut rule = DuplicateIndexRule::new(parse_number_ranges(drop_indices)?);
    if let Some(keep) = keep_index {
        rule = rule.with_keep(keep);
    }
    Ok(ExtensionPolicy::keep_all().with_rule(rule))
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Stitch {
            sort_by_time,
            time_column,
            drop_indices,
            keep_index,
            keep_all_extensions,
            statistics,
            remove_partial,
            exptime,
            output,
            inputs,
        } => {
            let order = if *sort_by_time {
                FileOrder::Time
            } else {
                FileOrder::Arguments
            };
            let policy = extension_policy(drop_indices, *keep_index, *keep_all_extensions)?;
            debug!("extension policy {policy:?}");

            stitch::stitch(
                inputs,
                output,
                &stitch::Options {
                    order,
                    time_column: time_column.clone(),
                    policy,
                    statistics: *statistics,
                    remove_partial: *remove_partial,
                    exposure: *exptime,
                },
            )
        }
        Commands::Info { input, format } => info::info(input, format),
        Commands::Resort { force, file } => resort::resort(file, *force),
    }
}

/// Exit status for a failed run, taken from the library error if there is one.
fn exit_status(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<zlp_stitch::Error>()
        .map_or(1, zlp_stitch::Error::status)
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("ZLP_STITCH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        std::process::exit(exit_status(&err));
    }
}
