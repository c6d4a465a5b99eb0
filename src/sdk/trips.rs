use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use thiserror::Error;

use super::config::ConfigError;
use super::error::Result;
use super::persist::{OutputColumns, PersistError};
use super::pipeline::partition;

pub const ID_COLUMN: &str = "id";
pub const PICKUP_LATITUDE: &str = "pickup_latitude";
pub const PICKUP_LONGITUDE: &str = "pickup_longitude";
pub const DROPOFF_LATITUDE: &str = "dropoff_latitude";
pub const DROPOFF_LONGITUDE: &str = "dropoff_longitude";
pub const PICKUP_ADDRESS: &str = "PU_Address";
pub const DROPOFF_ADDRESS: &str = "DO_Address";
pub const DATE_COLUMN: &str = "Date";
pub const TIME_COLUMN: &str = "Time";

const COORDINATE_COLUMNS: [&str; 4] = [
    PICKUP_LATITUDE,
    PICKUP_LONGITUDE,
    DROPOFF_LATITUDE,
    DROPOFF_LONGITUDE,
];
const ADDRESS_COLUMNS: [&str; 2] = [PICKUP_ADDRESS, DROPOFF_ADDRESS];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid number in row {row}, column {column}: {value:?}")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Missing value in row {row}, column {column}")]
    MissingValue { row: usize, column: String },

    #[error("Cannot sample {requested} records from a load of {available}")]
    SampleTooLarge { requested: usize, available: usize },
}

/// Which pair of location columns the source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripSchema {
    Coordinates,
    Address,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Coordinates { latitude: f64, longitude: f64 },
    Address(String),
}

impl Location {
    /// The form the directions API accepts for `origin`/`destination`.
    pub fn descriptor(&self) -> String {
        match self {
            Location::Coordinates {
                latitude,
                longitude,
            } => format!("{},{}", latitude, longitude),
            Location::Address(address) => address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub id: Option<u64>,
    pub pickup: Location,
    pub dropoff: Location,
    pub date: Option<String>,
    pub time: Option<String>,
}

impl TripRecord {
    /// `id` when the record has one, else its position within the load.
    pub fn identity(&self, position: usize) -> u64 {
        self.id.unwrap_or(position as u64)
    }
}

#[derive(Debug, Clone)]
pub struct TripSet {
    pub schema: TripSchema,
    pub records: Vec<TripRecord>,
    /// Columns the source carries besides the locations.
    pub columns: OutputColumns,
    /// Data row numbers (1-based, file order) dropped for a missing or malformed value.
    pub skipped_rows: Vec<usize>,
}

impl TripSet {
    pub fn has_ids(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.id.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Overwrite (or add) `id` with each row's zero-based position in the full load.
    pub assign_ids: bool,
    pub sample_size: Option<usize>,
    pub seed: Option<u64>,
}

/// A delimited source held in memory, headers already trimmed.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Every row padded or truncated to the header width.
    pub rows: Vec<StringRecord>,
    /// 1-based data row number in the source file, parallel to `rows`.
    pub row_numbers: Vec<usize>,
}

impl RawTable {
    pub fn read<P: AsRef<Path>>(path: P) -> std::result::Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .flexible(true)
            .from_reader(file);

        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let width = headers.len();
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let row_no = rows.len() + 1;
            if record.len() != width {
                log::warn!(
                    "Row {} has {} fields, expected {}",
                    row_no,
                    record.len(),
                    width
                );
            }
            rows.push(fit_width(&record, width));
        }
        log::info!("Data loaded: {} rows from {}", rows.len(), path.display());

        let row_numbers = (1..=rows.len()).collect();
        Ok(Self {
            headers,
            rows,
            row_numbers,
        })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require(&self, name: &str) -> std::result::Result<usize, LoadError> {
        self.column(name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    }

    /// Writes zero-based positions into `id`, appending the column when absent.
    pub fn assign_ids(&mut self) {
        let existing = self.column(ID_COLUMN);
        if existing.is_none() {
            self.headers.push(ID_COLUMN.to_string());
        }
        for (position, row) in self.rows.iter_mut().enumerate() {
            let id = position.to_string();
            *row = match existing {
                Some(col) => row
                    .iter()
                    .enumerate()
                    .map(|(i, value)| if i == col { id.as_str() } else { value })
                    .collect(),
                None => {
                    let mut extended = row.clone();
                    extended.push_field(&id);
                    extended
                }
            };
        }
    }

    /// Keeps `size` rows drawn uniformly without replacement, in draw order.
    pub fn sample(&mut self, size: usize, seed: Option<u64>) -> std::result::Result<(), LoadError> {
        let available = self.rows.len();
        if size > available {
            return Err(LoadError::SampleTooLarge {
                requested: size,
                available,
            });
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let picked = rand::seq::index::sample(&mut rng, available, size);
        let mut rows = std::mem::take(&mut self.rows);
        let row_numbers = std::mem::take(&mut self.row_numbers);
        let (rows, row_numbers): (Vec<StringRecord>, Vec<usize>) = picked
            .into_iter()
            .map(|i| (std::mem::take(&mut rows[i]), row_numbers[i]))
            .unzip();
        self.rows = rows;
        self.row_numbers = row_numbers;
        Ok(())
    }

    pub fn schema(&self) -> std::result::Result<TripSchema, LoadError> {
        let has = |name: &str| self.column(name).is_some();
        if COORDINATE_COLUMNS.iter().all(|c| has(c)) {
            return Ok(TripSchema::Coordinates);
        }
        if ADDRESS_COLUMNS.iter().all(|c| has(c)) {
            return Ok(TripSchema::Address);
        }
        // Blame the schema the header was closest to
        let expected: &[&str] = if ADDRESS_COLUMNS.iter().any(|c| has(c)) {
            &ADDRESS_COLUMNS
        } else {
            &COORDINATE_COLUMNS
        };
        let missing = expected.iter().find(|c| !has(c)).copied().unwrap_or(PICKUP_LATITUDE);
        Err(LoadError::MissingColumn(missing.to_string()))
    }

    pub fn into_trips(self) -> std::result::Result<TripSet, LoadError> {
        let schema = self.schema()?;
        let columns = match schema {
            TripSchema::Coordinates => LocationColumns::Coordinates([
                self.require(PICKUP_LATITUDE)?,
                self.require(PICKUP_LONGITUDE)?,
                self.require(DROPOFF_LATITUDE)?,
                self.require(DROPOFF_LONGITUDE)?,
            ]),
            TripSchema::Address => LocationColumns::Address {
                pickup: self.require(PICKUP_ADDRESS)?,
                dropoff: self.require(DROPOFF_ADDRESS)?,
            },
        };
        let id_col = self.column(ID_COLUMN);
        let date_col = self.column(DATE_COLUMN);
        let time_col = self.column(TIME_COLUMN);

        let mut records = Vec::with_capacity(self.rows.len());
        let mut skipped_rows = Vec::new();
        for (row, &row_no) in self.rows.iter().zip(&self.row_numbers) {
            let parsed = columns
                .locations(&self.headers, row_no, row)
                .and_then(|locations| parse_id(row, id_col, row_no).map(|id| (locations, id)));
            let ((pickup, dropoff), id) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("Skipping row {}: {}", row_no, e);
                    skipped_rows.push(row_no);
                    continue;
                }
            };
            records.push(TripRecord {
                id,
                pickup,
                dropoff,
                date: date_col.and_then(|col| field(row, col)),
                time: time_col.and_then(|col| field(row, col)),
            });
        }
        if !skipped_rows.is_empty() {
            log::warn!(
                "Skipped {} of {} rows with missing or malformed values",
                skipped_rows.len(),
                self.rows.len()
            );
        }
        skipped_rows.sort_unstable();

        Ok(TripSet {
            schema,
            records,
            columns: OutputColumns {
                id: id_col.is_some(),
                date: date_col.is_some(),
                time: time_col.is_some(),
            },
            skipped_rows,
        })
    }
}

enum LocationColumns {
    Coordinates([usize; 4]),
    Address { pickup: usize, dropoff: usize },
}

impl LocationColumns {
    fn locations(
        &self,
        headers: &[String],
        row_no: usize,
        row: &StringRecord,
    ) -> std::result::Result<(Location, Location), LoadError> {
        match self {
            LocationColumns::Coordinates(cols) => {
                let mut values = [0.0; 4];
                for (slot, &col) in values.iter_mut().zip(cols) {
                    *slot = parse_f64(row, col, row_no, &headers[col])?;
                }
                Ok((
                    Location::Coordinates {
                        latitude: values[0],
                        longitude: values[1],
                    },
                    Location::Coordinates {
                        latitude: values[2],
                        longitude: values[3],
                    },
                ))
            }
            LocationColumns::Address { pickup, dropoff } => {
                let address = |col: usize| {
                    field(row, col)
                        .map(Location::Address)
                        .ok_or_else(|| LoadError::MissingValue {
                            row: row_no,
                            column: headers[col].clone(),
                        })
                };
                Ok((address(*pickup)?, address(*dropoff)?))
            }
        }
    }
}

fn fit_width(record: &StringRecord, width: usize) -> StringRecord {
    let mut fitted: StringRecord = record.iter().take(width).collect();
    while fitted.len() < width {
        fitted.push_field("");
    }
    fitted
}

fn parse_id(
    row: &StringRecord,
    id_col: Option<usize>,
    row_no: usize,
) -> std::result::Result<Option<u64>, LoadError> {
    match id_col.and_then(|col| field(row, col)) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| LoadError::InvalidNumber {
                row: row_no,
                column: ID_COLUMN.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

fn field(row: &StringRecord, col: usize) -> Option<String> {
    row.get(col)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_f64(
    row: &StringRecord,
    col: usize,
    row_no: usize,
    column: &str,
) -> std::result::Result<f64, LoadError> {
    let raw = row.get(col).unwrap_or_default().trim();
    if raw.is_empty() {
        return Err(LoadError::MissingValue {
            row: row_no,
            column: column.to_string(),
        });
    }
    raw.parse::<f64>().map_err(|_| LoadError::InvalidNumber {
        row: row_no,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Reads trip records from a CSV source.
///
/// Identifiers are assigned over the full load before any sampling, so a record keeps
/// its identifier whichever sample it ends up in.
pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> std::result::Result<TripSet, LoadError> {
    let mut table = RawTable::read(path)?;
    // Fail on a bad header before spending time on ids or sampling
    table.schema()?;
    if options.assign_ids {
        table.assign_ids();
    }
    if let Some(size) = options.sample_size {
        table.sample(size, options.seed)?;
    }
    table.into_trips()
}

/// Samples a source and writes each batch of the sample as its own CSV.
///
/// Every row gets an `id` spanning the full source first. Files are named
/// `{stem}_batch_{start + batch_size}.csv`.
pub fn write_sample_batches<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    out_dir: Q,
    stem: &str,
    sample_size: Option<usize>,
    batch_size: usize,
    seed: Option<u64>,
) -> Result<Vec<PathBuf>> {
    if batch_size == 0 {
        return Err(ConfigError::Invalid {
            name: "batch_size",
            value: batch_size.to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    let out_dir = out_dir.as_ref();

    let mut table = RawTable::read(source)?;
    table.assign_ids();
    if let Some(size) = sample_size {
        table.sample(size, seed)?;
    }

    fs::create_dir_all(out_dir).map_err(|source| PersistError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for range in partition(table.rows.len(), batch_size) {
        let path = out_dir.join(format!("{}_batch_{}.csv", stem, range.start + batch_size));
        write_rows(&path, &table.headers, &table.rows[range.clone()])?;
        log::info!("Wrote {} rows to {}", range.len(), path.display());
        written.push(path);
    }

    Ok(written)
}

fn write_rows(
    path: &Path,
    headers: &[String],
    rows: &[StringRecord],
) -> std::result::Result<(), PersistError> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn coordinate_csv(rows: usize) -> NamedTempFile {
        let mut content = String::from(
            " pickup_latitude , pickup_longitude,dropoff_latitude, dropoff_longitude\n",
        );
        for i in 0..rows {
            content.push_str(&format!(
                "40.7{i},-73.9{i},40.8{i},-73.8{i}\n",
                i = i % 10
            ));
        }
        create_csv(&content)
    }

    #[test]
    fn test_headers_are_trimmed() {
        let csv = coordinate_csv(2);
        let table = RawTable::read(csv.path()).unwrap();
        assert_eq!(
            table.headers,
            vec![PICKUP_LATITUDE, PICKUP_LONGITUDE, DROPOFF_LATITUDE, DROPOFF_LONGITUDE]
        );
        assert_eq!(table.schema().unwrap(), TripSchema::Coordinates);
    }

    #[test]
    fn test_load_coordinates() {
        let csv = coordinate_csv(3);
        let trips = load(csv.path(), &LoadOptions::default()).unwrap();
        assert_eq!(trips.records.len(), 3);
        assert!(!trips.has_ids());
        let first = &trips.records[0];
        assert_eq!(first.pickup.descriptor(), "40.7,-73.9");
        assert_eq!(first.dropoff.descriptor(), "40.8,-73.8");
        assert_eq!(first.identity(0), 0);
        assert_eq!(trips.records[2].identity(2), 2);
    }

    #[test]
    fn test_load_addresses() {
        let csv = create_csv(
            "Date , Time,PU_Address, DO_Address \n\
             07/01/2014,17:16,\"1 Penn Plaza, New York\",\"JFK Airport, Queens\"\n\
             07/02/2014,, Grand Central ,Times Square\n",
        );
        let trips = load(csv.path(), &LoadOptions::default()).unwrap();
        assert_eq!(trips.schema, TripSchema::Address);
        assert_eq!(trips.records[0].pickup.descriptor(), "1 Penn Plaza, New York");
        assert_eq!(trips.records[0].date.as_deref(), Some("07/01/2014"));
        assert_eq!(trips.records[0].time.as_deref(), Some("17:16"));
        assert_eq!(trips.records[1].pickup.descriptor(), "Grand Central");
        assert_eq!(trips.records[1].time, None);
        assert_eq!(
            trips.columns,
            OutputColumns {
                id: false,
                date: true,
                time: true
            }
        );
    }

    #[test]
    fn test_missing_columns() {
        let csv = create_csv("pickup_latitude,pickup_longitude,dropoff_latitude\n1,2,3\n");
        let err = load(csv.path(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(c) if c == DROPOFF_LONGITUDE));
    }

    #[test]
    fn test_unreadable_source() {
        let err = load("/definitely/not/here.csv", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_invalid_coordinate_skips_row() {
        let csv = create_csv(
            "pickup_latitude,pickup_longitude,dropoff_latitude,dropoff_longitude\n\
             40.7,abc,40.8,-73.8\n\
             40.6,-73.9,40.8,-73.8\n",
        );
        let trips = load(csv.path(), &LoadOptions::default()).unwrap();
        assert_eq!(trips.records.len(), 1);
        assert_eq!(trips.skipped_rows, vec![1]);
        assert_eq!(trips.records[0].pickup.descriptor(), "40.6,-73.9");
    }

    #[test]
    fn test_blank_dropoff_skips_row_but_keeps_ids() {
        let csv = create_csv(
            "pickup_latitude,pickup_longitude,dropoff_latitude,dropoff_longitude\n\
             40.5,-73.9,40.8,-73.8\n\
             40.7,-73.9,,\n\
             40.6,-73.9,40.8,-73.8\n",
        );
        let options = LoadOptions {
            assign_ids: true,
            ..Default::default()
        };
        let trips = load(csv.path(), &options).unwrap();
        assert_eq!(trips.skipped_rows, vec![2]);
        let ids: Vec<_> = trips.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(0), Some(2)]);
    }

    #[test]
    fn test_ragged_rows_are_fitted() {
        let csv = create_csv(
            "pickup_latitude,pickup_longitude,dropoff_latitude,dropoff_longitude\n\
             40.5,-73.9\n\
             40.6,-73.9,40.8,-73.8,extra\n\
             40.7,-73.9,40.8,-73.8\n",
        );
        let table = RawTable::read(csv.path()).unwrap();
        assert!(table.rows.iter().all(|r| r.len() == 4));

        let trips = table.into_trips().unwrap();
        assert_eq!(trips.skipped_rows, vec![1]);
        assert_eq!(trips.records.len(), 2);
    }

    #[test]
    fn test_blank_address_skips_row() {
        let csv = create_csv("PU_Address,DO_Address\nGrand Central,\nGrand Central,Times Square\n");
        let trips = load(csv.path(), &LoadOptions::default()).unwrap();
        assert_eq!(trips.skipped_rows, vec![1]);
        assert_eq!(trips.records.len(), 1);
        assert_eq!(trips.columns, OutputColumns::default());
    }

    #[test]
    fn test_existing_ids_are_read() {
        let csv = create_csv(
            "pickup_latitude,pickup_longitude,dropoff_latitude,dropoff_longitude,id\n\
             40.7,-73.9,40.8,-73.8,17\n\
             40.6,-73.9,40.8,-73.8,4\n",
        );
        let trips = load(csv.path(), &LoadOptions::default()).unwrap();
        assert!(trips.has_ids());
        assert_eq!(trips.records[0].identity(0), 17);
        assert_eq!(trips.records[1].identity(1), 4);
    }

    #[test]
    fn test_assign_ids_overwrites_existing() {
        let csv = create_csv(
            "id,pickup_latitude,pickup_longitude,dropoff_latitude,dropoff_longitude\n\
             9,40.7,-73.9,40.8,-73.8\n\
             9,40.6,-73.9,40.8,-73.8\n",
        );
        let options = LoadOptions {
            assign_ids: true,
            ..Default::default()
        };
        let trips = load(csv.path(), &options).unwrap();
        let ids: Vec<_> = trips.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_ids_stable_under_sampling() {
        let csv = coordinate_csv(50);
        let full = load(
            csv.path(),
            &LoadOptions {
                assign_ids: true,
                ..Default::default()
            },
        )
        .unwrap();

        for seed in 0..5 {
            let sampled = load(
                csv.path(),
                &LoadOptions {
                    assign_ids: true,
                    sample_size: Some(10),
                    seed: Some(seed),
                },
            )
            .unwrap();
            assert_eq!(sampled.records.len(), 10);
            for record in &sampled.records {
                let id = record.id.unwrap() as usize;
                assert_eq!(record, &full.records[id]);
            }
            let mut ids: Vec<_> = sampled.records.iter().map(|r| r.id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 10);
        }
    }

    #[test]
    fn test_seeded_sample_is_reproducible() {
        let csv = coordinate_csv(30);
        let options = LoadOptions {
            assign_ids: true,
            sample_size: Some(5),
            seed: Some(42),
        };
        let a = load(csv.path(), &options).unwrap();
        let b = load(csv.path(), &options).unwrap();
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn test_sample_too_large() {
        let csv = coordinate_csv(3);
        let options = LoadOptions {
            sample_size: Some(4),
            ..Default::default()
        };
        let err = load(csv.path(), &options).unwrap_err();
        assert!(matches!(
            err,
            LoadError::SampleTooLarge {
                requested: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn test_write_sample_batches() {
        let csv = coordinate_csv(25);
        let dir = tempfile::tempdir().unwrap();
        let paths =
            write_sample_batches(csv.path(), dir.path(), "trip_data_6", Some(20), 8, Some(7))
                .unwrap();

        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "trip_data_6_batch_8.csv",
                "trip_data_6_batch_16.csv",
                "trip_data_6_batch_24.csv"
            ]
        );

        let mut seen = Vec::new();
        for path in &paths {
            let trips = load(path, &LoadOptions::default()).unwrap();
            assert!(trips.has_ids());
            seen.extend(trips.records.iter().map(|r| r.id.unwrap()));
        }
        assert_eq!(seen.len(), 20);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
        assert!(seen.iter().all(|&id| id < 25));
    }

    #[test]
    fn test_write_sample_batches_rejects_zero_batch() {
        let csv = coordinate_csv(2);
        let dir = tempfile::tempdir().unwrap();
        assert!(write_sample_batches(csv.path(), dir.path(), "x", None, 0, None).is_err());
    }
}
