use std::{fs, ops::Range, path::PathBuf};

use super::config::PipelineConfig;
use super::error::Result;
use super::persist::{self, OutputColumns, PersistError, RouteResult};
use super::routing::{decode_lon_lat, FetchOutcome, RouteFetcher};
use super::trips::TripRecord;

/// Splits `0..len` into contiguous ranges of `batch_size`; the last one may be shorter.
///
/// # Panics
///
/// Panics if `batch_size` is zero.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    assert!(batch_size > 0, "batch size must be non-zero");
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Table columns covering every record of a run, whichever batch they fall in.
pub fn columns_for(records: &[TripRecord]) -> OutputColumns {
    OutputColumns {
        id: records.iter().any(|r| r.id.is_some()),
        date: records.iter().any(|r| r.date.is_some()),
        time: records.iter().any(|r| r.time.is_some()),
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(RouteResult),
    NotFound,
    FilteredOut { points: usize },
    Undecodable,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub range: Range<usize>,
    pub table_path: PathBuf,
    pub geometry_path: PathBuf,
    pub persisted: usize,
    pub not_found: usize,
    pub filtered_out: usize,
    pub undecodable: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub fetched: usize,
    pub persisted: usize,
    pub not_found: usize,
    pub filtered_out: usize,
    pub undecodable: usize,
}

impl RunSummary {
    fn add(&mut self, batch: &BatchOutcome) {
        self.batches += 1;
        self.fetched += batch.range.len();
        self.persisted += batch.persisted;
        self.not_found += batch.not_found;
        self.filtered_out += batch.filtered_out;
        self.undecodable += batch.undecodable;
    }
}

/// Fetches a route per record, one request at a time, and persists each batch as
/// soon as it is complete.
pub struct Pipeline<F> {
    fetcher: F,
    config: PipelineConfig,
}

impl<F: RouteFetcher> Pipeline<F> {
    pub fn new(fetcher: F, config: PipelineConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, records: &[TripRecord]) -> Result<RunSummary> {
        let out_dir = &self.config.output_dir;
        fs::create_dir_all(out_dir).map_err(|source| PersistError::Io {
            path: out_dir.clone(),
            source,
        })?;

        let batch_size = self.config.batch_size();
        let batches = partition(records.len(), batch_size);
        let columns = self
            .config
            .columns
            .unwrap_or_else(|| columns_for(records));
        log::info!(
            "Fetching routes for {} records in {} batches of up to {}",
            records.len(),
            batches.len(),
            batch_size
        );

        let mut summary = RunSummary::default();
        for (n, range) in batches.iter().enumerate() {
            log::info!(
                "Batch {}/{}: records {}..{}",
                n + 1,
                batches.len(),
                range.start,
                range.end
            );
            let outcome = self.run_batch(records, range.clone(), batches.len(), columns)?;
            summary.add(&outcome);
        }

        log::info!(
            "All routes saved: {} persisted, {} without route, {} filtered out, {} undecodable",
            summary.persisted,
            summary.not_found,
            summary.filtered_out,
            summary.undecodable
        );
        Ok(summary)
    }

    /// Processes `records[range]` and writes its table and geometry files.
    pub fn run_batch(
        &self,
        records: &[TripRecord],
        range: Range<usize>,
        total_batches: usize,
        columns: OutputColumns,
    ) -> Result<BatchOutcome> {
        let mut results = Vec::new();
        let (mut not_found, mut filtered_out, mut undecodable) = (0, 0, 0);

        for position in range.clone() {
            match self.process(position, &records[position])? {
                RecordOutcome::Accepted(result) => results.push(result),
                RecordOutcome::NotFound => not_found += 1,
                RecordOutcome::FilteredOut { .. } => filtered_out += 1,
                RecordOutcome::Undecodable => undecodable += 1,
            }
        }

        let stem = self.output_stem(&range, total_batches);
        let table_path = self.config.output_dir.join(format!("{}.csv", stem));
        let geometry_path = self.config.output_dir.join(format!("{}.geojson", stem));
        persist::write_table(&results, columns, &table_path)?;
        persist::write_geometry(&results, &geometry_path)?;
        log::info!(
            "Saved {} routes to {} and {}",
            results.len(),
            table_path.display(),
            geometry_path.display()
        );

        Ok(BatchOutcome {
            range,
            table_path,
            geometry_path,
            persisted: results.len(),
            not_found,
            filtered_out,
            undecodable,
        })
    }

    /// Fetches, decodes and filters a single record.
    ///
    /// Only API failures are returned as errors; everything else is an outcome.
    pub fn process(&self, position: usize, record: &TripRecord) -> Result<RecordOutcome> {
        let pickup = record.pickup.descriptor();
        let dropoff = record.dropoff.descriptor();
        let identity = record.identity(position);

        let encoded = match self.fetcher.fetch(&pickup, &dropoff)? {
            FetchOutcome::Found(encoded) => encoded,
            FetchOutcome::NotFound { status } => {
                log::error!(
                    "No route found for record {} from {} to {} (status: {})",
                    identity,
                    pickup,
                    dropoff,
                    status.as_deref().unwrap_or("none")
                );
                return Ok(RecordOutcome::NotFound);
            }
        };

        let points = match decode_lon_lat(&encoded) {
            Ok(points) => points,
            Err(e) => {
                log::error!(
                    "Skipping record {} from {} to {}: {}",
                    identity,
                    pickup,
                    dropoff,
                    e
                );
                return Ok(RecordOutcome::Undecodable);
            }
        };

        if !self.config.filter.accepts(points.len()) {
            log::debug!(
                "Dropping route for record {} with {} points",
                identity,
                points.len()
            );
            return Ok(RecordOutcome::FilteredOut {
                points: points.len(),
            });
        }

        Ok(RecordOutcome::Accepted(RouteResult {
            id: record.id,
            pickup,
            dropoff,
            date: record.date.clone(),
            time: record.time.clone(),
            points,
        }))
    }

    /// `{prefix}_{start}_{end}`, or `{prefix}_{label}` for a labelled single-batch run.
    pub fn output_stem(&self, range: &Range<usize>, total_batches: usize) -> String {
        let prefix = &self.config.prefix;
        match &self.config.label {
            Some(label) if total_batches <= 1 => format!("{}_{}", prefix, label),
            Some(label) => format!("{}_{}_{}_{}", prefix, label, range.start, range.end),
            None => format!("{}_{}_{}", prefix, range.start, range.end),
        }
    }
}
