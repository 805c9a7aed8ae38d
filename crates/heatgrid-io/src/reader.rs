//! CSV readers for grid-cell tables and partial-dependence tables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use heatgrid_eval::{CityId, Dataset, HoldoutGroup, Observation, PdRecord};
use tracing::{debug, info, instrument};

use crate::IoError;

const REQUIRED: [&str; 6] = ["city", "holdout", "x", "y", "lst_day_mean", "lst_night_mean"];

/// Reads a grid-cell table from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - Columns `city`, `holdout`, `x`, `y`, `lst_day_mean` and `lst_night_mean`
///   in any position
/// - Every other named column is a numeric covariate, kept in header order
/// - Columns with a blank header (an exported row index) and columns passed
///   to [`with_skipped_columns`](Self::with_skipped_columns) are ignored
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | A required column is absent |
/// | [`IoError::DuplicateColumn`] | Two header cells share a name |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::BlankIdentifier`] | `city` or `holdout` cell is blank |
/// | [`IoError::NonFiniteValue`] | Numeric cell is NaN, Inf, or unparseable |
pub struct DatasetReader {
    path: PathBuf,
    skipped: Vec<String>,
}

struct Layout {
    city: usize,
    holdout: usize,
    numeric: [usize; 4],
    covariates: Vec<(usize, String)>,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            skipped: Vec::new(),
        }
    }

    /// Ignore the named columns instead of reading them as covariates.
    #[must_use]
    pub fn with_skipped_columns(mut self, skipped: Vec<String>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Read and validate the CSV file, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of a CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.parse_error(e))?.clone();
        let layout = self.layout(&header)?;
        let expected_cols = header.len();
        debug!(
            expected_cols,
            n_covariates = layout.covariates.len(),
            "read CSV header"
        );

        let mut observations = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let city = self.identifier(&record, row_index, layout.city, "city")?;
            let holdout = self.identifier(&record, row_index, layout.holdout, "holdout")?;
            let [x, y, lst_day, lst_night] = layout
                .numeric
                .map(|col| self.number(&record, row_index, col, &header[col]));
            let covariates = layout
                .covariates
                .iter()
                .map(|(col, name)| self.number(&record, row_index, *col, name))
                .collect::<Result<Vec<_>, _>>()?;

            observations.push(Observation {
                city: CityId::new(city),
                holdout: HoldoutGroup::new(holdout),
                x: x?,
                y: y?,
                lst_day: lst_day?,
                lst_night: lst_night?,
                covariates,
            });
        }

        if observations.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let n_rows = observations.len();
        let names = layout.covariates.into_iter().map(|(_, name)| name).collect();
        let dataset = Dataset::new(names, observations).map_err(|source| {
            IoError::InvalidDataset {
                path: self.path.clone(),
                source,
            }
        })?;

        info!(
            n_rows,
            n_cities = dataset.cities().len(),
            n_covariates = dataset.covariate_names().len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    fn layout(&self, header: &csv::StringRecord) -> Result<Layout, IoError> {
        let mut seen = HashSet::new();
        for name in header.iter().filter(|n| !n.is_empty()) {
            if !seen.insert(name) {
                return Err(IoError::DuplicateColumn {
                    path: self.path.clone(),
                    column: name.to_owned(),
                });
            }
        }
        let position = |column: &'static str| {
            header
                .iter()
                .position(|n| n == column)
                .ok_or_else(|| IoError::MissingColumn {
                    path: self.path.clone(),
                    column,
                })
        };
        let [city, holdout, x, y, day, night] = [
            position(REQUIRED[0])?,
            position(REQUIRED[1])?,
            position(REQUIRED[2])?,
            position(REQUIRED[3])?,
            position(REQUIRED[4])?,
            position(REQUIRED[5])?,
        ];
        let covariates = header
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                !name.is_empty()
                    && !REQUIRED.contains(name)
                    && !self.skipped.iter().any(|s| s == name)
            })
            .map(|(i, name)| (i, name.to_owned()))
            .collect();
        Ok(Layout {
            city,
            holdout,
            numeric: [x, y, day, night],
            covariates,
        })
    }

    fn identifier(
        &self,
        record: &csv::StringRecord,
        row_index: usize,
        col: usize,
        column: &'static str,
    ) -> Result<String, IoError> {
        let raw = record.get(col).unwrap_or("").trim();
        if raw.is_empty() {
            return Err(IoError::BlankIdentifier {
                path: self.path.clone(),
                row_index,
                column,
            });
        }
        Ok(raw.to_owned())
    }

    fn number(
        &self,
        record: &csv::StringRecord,
        row_index: usize,
        col: usize,
        column: &str,
    ) -> Result<f64, IoError> {
        let raw = record.get(col).unwrap_or("");
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: column.to_owned(),
                raw: raw.to_owned(),
            }),
        }
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

/// Read a partial-dependence table written by
/// [`ResultWriter::write_partial_dependence`](crate::ResultWriter::write_partial_dependence).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed record or unknown model/period label |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_partial_dependence(path: &Path) -> Result<Vec<PdRecord>, IoError> {
    let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let records = rdr
        .deserialize()
        .collect::<Result<Vec<PdRecord>, _>>()
        .map_err(|e| IoError::CsvParse {
            path: path.to_path_buf(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
    if records.is_empty() {
        return Err(IoError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }
    info!(n_records = records.len(), "partial dependence loaded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const HEADER: &str = "city,holdout,x,y,lst_day_mean,lst_night_mean,alb_mean,bldg";

    #[test]
    fn reads_valid_table() {
        let f = write_csv(&format!(
            "{HEADER}\naustin,a1,1.0,2.0,35.2,24.1,0.12,0.4\nboston,b1,3.0,4.0,31.0,21.5,0.2,0.1\n"
        ));
        let ds = DatasetReader::new(f.path()).read().unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.covariate_names(), &["alb_mean".to_owned(), "bldg".to_owned()]);
        let obs = &ds.observations()[1];
        assert_eq!(obs.city.as_str(), "boston");
        assert_eq!(obs.lst_night, 21.5);
        assert_eq!(obs.covariates, vec![0.2, 0.1]);
    }

    #[test]
    fn columns_may_appear_in_any_order_and_index_is_ignored() {
        let f = write_csv(
            ",tree_mean,lst_night_mean,lst_day_mean,y,x,holdout,city,area\n\
             0,0.3,20,30,0,0,g1,austin,900\n",
        );
        let ds = DatasetReader::new(f.path())
            .with_skipped_columns(vec!["area".to_owned()])
            .read()
            .unwrap();
        assert_eq!(ds.covariate_names(), &["tree_mean".to_owned()]);
        assert_eq!(ds.observations()[0].lst_day, 30.0);
    }

    #[test]
    fn missing_required_column() {
        let f = write_csv("city,holdout,x,y,lst_day_mean,alb_mean\naustin,g,0,0,30,0.1\n");
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::MissingColumn {
                column: "lst_night_mean",
                ..
            }
        ));
    }

    #[test]
    fn duplicate_column() {
        let f = write_csv(&format!("{HEADER},bldg\naustin,g,0,0,30,20,0.1,0.2,0.3\n"));
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::DuplicateColumn { .. }));
    }

    #[test]
    fn header_only_is_empty() {
        let f = write_csv(&format!("{HEADER}\n"));
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn ragged_row() {
        let f = write_csv(&format!("{HEADER}\naustin,g,0,0,30,20,0.1\n"));
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::InconsistentRowLength {
                row_index: 0,
                expected: 8,
                got: 7,
                ..
            }
        ));
    }

    #[test]
    fn non_finite_and_unparseable_cells() {
        for bad in ["NaN", "inf", "abc", ""] {
            let f = write_csv(&format!("{HEADER}\naustin,g,0,0,30,20,{bad},0.2\n"));
            let err = DatasetReader::new(f.path()).read().unwrap_err();
            assert!(
                matches!(err, IoError::NonFiniteValue { ref column, .. } if column == "alb_mean"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn blank_holdout() {
        let f = write_csv(&format!("{HEADER}\naustin, ,0,0,30,20,0.1,0.2\n"));
        let err = DatasetReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::BlankIdentifier {
                column: "holdout",
                ..
            }
        ));
    }

    #[test]
    fn file_not_found() {
        let err = DatasetReader::new(Path::new("/nonexistent/cells.csv"))
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }
}
