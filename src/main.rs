use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trip_routes::sdk::{
    config::{DirectionsConfig, PipelineConfig, PointFilter},
    persist::merge_directory,
    pipeline::Pipeline,
    routing::GoogleDirectionsProvider,
    trips::{load, write_sample_batches, LoadOptions},
    util::log::{init_logging, DEFAULT_LOG_FILE},
};

/// Fetches driving routes for trip records and saves them as CSV and GeoJSON
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Append-only log file; every line is also printed to stdout
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign ids, sample a raw trip file and split the sample into batch files
    Sample {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = "sample-data")]
        output_dir: PathBuf,

        /// File name stem; batches are written as {stem}_batch_{n}.csv
        #[arg(long)]
        stem: String,

        /// Number of records to sample (all records when omitted)
        #[arg(long)]
        size: Option<usize>,

        #[arg(long, default_value_t = 2000)]
        batch_size: usize,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Fetch a route for every record of a trip file
    Fetch {
        #[arg(short, long)]
        input: PathBuf,

        /// Only fetch a uniform random sample of this many records
        #[arg(long)]
        sample: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Number every record by its position in the file before sampling
        #[arg(long)]
        assign_ids: bool,

        #[arg(long, default_value_t = 2000)]
        batch_size: usize,

        #[arg(short, long, default_value = "pu-routes")]
        output_dir: PathBuf,

        #[arg(long, default_value = "trip_routes")]
        prefix: String,

        /// Name outputs by this label instead of by record range
        #[arg(long)]
        label: Option<String>,

        /// Drop routes with this many points or more
        #[arg(long, conflicts_with = "no_max_points")]
        max_points: Option<usize>,

        /// Keep routes of any length above one point
        #[arg(long)]
        no_max_points: bool,
    },

    /// Merge every GeoJSON file of a directory into one
    Merge {
        #[arg(short, long, default_value = "pu-routes")]
        dir: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Merge in file name order instead of directory listing order
        #[arg(long)]
        sorted: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(Some(&cli.log_file))
        .with_context(|| format!("Failed to open log file {}", cli.log_file.display()))?;

    match cli.command {
        Command::Sample {
            input,
            output_dir,
            stem,
            size,
            batch_size,
            seed,
        } => {
            let written = write_sample_batches(&input, &output_dir, &stem, size, batch_size, seed)?;
            log::info!(
                "Wrote {} batch files to {}",
                written.len(),
                output_dir.display()
            );
        }

        Command::Fetch {
            input,
            sample,
            seed,
            assign_ids,
            batch_size,
            output_dir,
            prefix,
            label,
            max_points,
            no_max_points,
        } => {
            // Configuration problems stop the run before any record is touched
            let directions = DirectionsConfig::from_env()?;
            let mut config = PipelineConfig::new(batch_size, output_dir)?;

            let trips = load(
                &input,
                &LoadOptions {
                    assign_ids,
                    sample_size: sample,
                    seed,
                },
            )
            .with_context(|| format!("Failed to load trips from {}", input.display()))?;

            if !trips.skipped_rows.is_empty() {
                log::warn!(
                    "{} rows could not be read and will not be fetched",
                    trips.skipped_rows.len()
                );
            }

            let mut filter = PointFilter::for_records(trips.has_ids());
            if no_max_points {
                filter = filter.with_max(None);
            } else if max_points.is_some() {
                filter = filter.with_max(max_points);
            }
            config.filter = filter;
            config.columns = Some(trips.columns);
            config.prefix = prefix;
            config.label = label;
            log::info!(
                "Loaded {} {:?} records; keeping routes with more than {} points{}",
                trips.records.len(),
                trips.schema,
                filter.min_exclusive,
                filter
                    .max_exclusive
                    .map(|max| format!(" and fewer than {}", max))
                    .unwrap_or_default()
            );

            let provider = GoogleDirectionsProvider::new(&directions)?;
            let pipeline = Pipeline::new(provider, config);
            let summary = pipeline.run(&trips.records)?;
            log::info!(
                "Done: {} of {} records saved across {} batches",
                summary.persisted,
                summary.fetched,
                summary.batches
            );
        }

        Command::Merge {
            dir,
            output,
            sorted,
        } => {
            let output = output.unwrap_or_else(|| dir.join("merged_routes.geojson"));
            let count = merge_directory(&dir, &output, sorted)?;
            log::info!("Merged {} routes into {}", count, output.display());
        }
    }

    Ok(())
}
