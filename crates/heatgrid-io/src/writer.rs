//! CSV and JSON writers for evaluation results.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use heatgrid_eval::{PdRecord, ResultRecord, ScopedModel, SelectionTrace, SwingRecord};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Subdirectory holding one partial-dependence table per bootstrap replicate.
pub const BOOTSTRAP_DIR: &str = "bootstrap";

/// Writes result tables and artifacts under one experiment prefix.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_{table}.csv` or `.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        create_dir(output_dir)?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Return the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write random-holdout scores to `{experiment}_holdout_results.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the table cannot be written.
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn write_holdout_results(&self, records: &[ResultRecord]) -> Result<PathBuf, IoError> {
        self.write_csv(self.path("holdout_results", "csv"), records)
    }

    /// Write leave-one-city-out scores to `{experiment}_city_holdout_results.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the table cannot be written.
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn write_city_holdout_results(
        &self,
        records: &[ResultRecord],
    ) -> Result<PathBuf, IoError> {
        self.write_csv(self.path("city_holdout_results", "csv"), records)
    }

    /// Write partial-dependence records.
    ///
    /// Full-data records go to `{experiment}_partial_dependence.csv`; records
    /// of bootstrap replicate `b` go to
    /// `bootstrap/{experiment}_partial_dependence_{b}.csv`. Returns the paths
    /// written, full-data table first, then replicates in ascending order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::OutputDirCreate`] | Bootstrap subdirectory cannot be created |
    /// | [`IoError::CsvWrite`] | A table cannot be written |
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn write_partial_dependence(&self, records: &[PdRecord]) -> Result<Vec<PathBuf>, IoError> {
        let mut by_boot: BTreeMap<Option<usize>, Vec<&PdRecord>> = BTreeMap::new();
        for record in records {
            by_boot.entry(record.boot).or_default().push(record);
        }

        let mut written = Vec::with_capacity(by_boot.len());
        for (boot, group) in by_boot {
            let path = match boot {
                None => self.path("partial_dependence", "csv"),
                Some(b) => {
                    let dir = self.output_dir.join(BOOTSTRAP_DIR);
                    create_dir(&dir)?;
                    dir.join(
                        self.experiment
                            .file_name(&format!("partial_dependence_{b}"), "csv"),
                    )
                }
            };
            written.push(self.write_csv(path, &group)?);
        }
        Ok(written)
    }

    /// Write swing importances to `{experiment}_swing.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if the table cannot be written.
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn write_swing(&self, records: &[SwingRecord]) -> Result<PathBuf, IoError> {
        self.write_csv(self.path("swing", "csv"), records)
    }

    /// Write selection traces to `{experiment}_variable_selection.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | Traces cannot be serialized |
    /// | [`IoError::WriteFile`] | File cannot be written |
    #[instrument(skip_all, fields(n_traces = traces.len()))]
    pub fn write_selection(&self, traces: &[SelectionTrace]) -> Result<PathBuf, IoError> {
        let artifact = SelectionArtifact {
            experiment: self.experiment.as_str(),
            traces,
        };
        self.write_json(self.path("variable_selection", "json"), &artifact)
    }

    /// Write scoped model summaries to `{experiment}_scoped_models.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | Summaries cannot be serialized |
    /// | [`IoError::WriteFile`] | File cannot be written |
    #[instrument(skip_all, fields(n_models = models.len()))]
    pub fn write_scoped_models(&self, models: &[ScopedModel]) -> Result<PathBuf, IoError> {
        let entries: Vec<ScopedEntry> = models
            .iter()
            .map(|m| ScopedEntry {
                scope: m.scope.to_string(),
                dependent: m.period.column(),
                r2: m.r2,
                mae: m.mae,
                importances: m
                    .importances()
                    .into_iter()
                    .map(|(name, importance)| ImportanceEntry { name, importance })
                    .collect(),
            })
            .collect();
        let artifact = ScopedArtifact {
            experiment: self.experiment.as_str(),
            models: entries,
        };
        self.write_json(self.path("scoped_models", "json"), &artifact)
    }

    fn path(&self, stem: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(self.experiment.file_name(stem, extension))
    }

    fn write_csv<R: Serialize>(&self, path: PathBuf, records: &[R]) -> Result<PathBuf, IoError> {
        let csv_error = |source| IoError::CsvWrite {
            path: path.clone(),
            source,
        };
        let mut wtr = csv::Writer::from_path(&path).map_err(csv_error)?;
        for record in records {
            wtr.serialize(record).map_err(csv_error)?;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), n_rows = records.len(), "table written");
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, path: PathBuf, artifact: &T) -> Result<PathBuf, IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Serialize {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "artifact written");
        Ok(path)
    }
}

fn create_dir(path: &Path) -> Result<(), IoError> {
    fs::create_dir_all(path).map_err(|e| IoError::OutputDirCreate {
        path: path.to_path_buf(),
        source: e,
    })
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct SelectionArtifact<'a> {
    experiment: &'a str,
    traces: &'a [SelectionTrace],
}

#[derive(Serialize)]
struct ScopedArtifact<'a> {
    experiment: &'a str,
    models: Vec<ScopedEntry>,
}

#[derive(Serialize)]
struct ScopedEntry {
    scope: String,
    dependent: &'static str,
    r2: f64,
    mae: f64,
    importances: Vec<ImportanceEntry>,
}

#[derive(Serialize)]
struct ImportanceEntry {
    name: String,
    importance: f64,
}

#[cfg(test)]
mod tests {
    use heatgrid_eval::{ErrorMetric, ResponsePeriod, TimeOfDay};
    use heatgrid_models::ModelFamily;
    use tempfile::TempDir;

    use super::*;

    fn writer(dir: &TempDir) -> ResultWriter {
        ResultWriter::new(dir.path(), ExperimentName::new("run".into()).unwrap()).unwrap()
    }

    fn pd(boot: Option<usize>, x: f64) -> PdRecord {
        PdRecord {
            model: ModelFamily::Gam,
            dependent: ResponsePeriod::Night,
            independent: "tree_mean".to_owned(),
            x,
            mean: 21.0,
            boot,
        }
    }

    #[test]
    fn holdout_table_has_labelled_columns() {
        let dir = TempDir::new().unwrap();
        let path = writer(&dir)
            .write_holdout_results(&[ResultRecord {
                time_of_day: TimeOfDay::Nocturnal,
                holdout_id: "3".to_owned(),
                model: ModelFamily::Linear,
                error_metric: ErrorMetric::R2,
                error: 0.5,
            }])
            .unwrap();
        assert_eq!(path, dir.path().join("run_holdout_results.csv"));
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "time_of_day,holdout_id,model,error_metric,error"
        );
        assert_eq!(lines.next().unwrap(), "nocturnal,3,mlr,r2,0.5");
    }

    #[test]
    fn bootstrap_replicates_get_their_own_files() {
        let dir = TempDir::new().unwrap();
        let paths = writer(&dir)
            .write_partial_dependence(&[pd(Some(1), 0.1), pd(None, 0.2), pd(Some(0), 0.3)])
            .unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("run_partial_dependence.csv"),
                dir.path().join("bootstrap").join("run_partial_dependence_0.csv"),
                dir.path().join("bootstrap").join("run_partial_dependence_1.csv"),
            ]
        );
        let full = fs::read_to_string(&paths[0]).unwrap();
        assert!(full.lines().nth(1).unwrap().ends_with(",0.2,21.0,"));
    }

    #[test]
    fn creates_missing_output_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer =
            ResultWriter::new(&nested, ExperimentName::new("run".into()).unwrap()).unwrap();
        assert!(writer.output_dir().is_dir());
    }
}
