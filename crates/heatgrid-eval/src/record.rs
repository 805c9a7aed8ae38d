//! Flat result records produced by the evaluation drivers.

use std::fmt;

use heatgrid_models::ModelFamily;

use crate::EvalError;

/// Which temperature response a model predicts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ResponsePeriod {
    /// Mean diurnal land-surface temperature.
    #[serde(rename = "lst_day_mean")]
    Day,
    /// Mean nocturnal land-surface temperature.
    #[serde(rename = "lst_night_mean")]
    Night,
}

impl ResponsePeriod {
    /// Both periods, day first.
    pub const BOTH: [ResponsePeriod; 2] = [ResponsePeriod::Day, ResponsePeriod::Night];

    /// Name of the response column.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            ResponsePeriod::Day => "lst_day_mean",
            ResponsePeriod::Night => "lst_night_mean",
        }
    }

    /// Time-of-day label used in error tables.
    #[must_use]
    pub fn time_of_day(self) -> TimeOfDay {
        match self {
            ResponsePeriod::Day => TimeOfDay::Diurnal,
            ResponsePeriod::Night => TimeOfDay::Nocturnal,
        }
    }
}

impl fmt::Display for ResponsePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Time-of-day label of an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// Daytime response.
    Diurnal,
    /// Night-time response.
    Nocturnal,
}

/// Error metric of a [`ResultRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMetric {
    /// Coefficient of determination.
    R2,
    /// Mean absolute error.
    Mae,
}

/// One out-of-sample score.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRecord {
    /// Response period the model predicted.
    pub time_of_day: TimeOfDay,
    /// Trial index for random holdouts, `hold-<city>` for city holdouts.
    pub holdout_id: String,
    /// Family that produced the predictions.
    pub model: ModelFamily,
    /// Metric the value measures.
    pub error_metric: ErrorMetric,
    /// Metric value.
    pub error: f64,
}

/// One partial-dependence point.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PdRecord {
    /// Fitted family.
    pub model: ModelFamily,
    /// Response period.
    pub dependent: ResponsePeriod,
    /// Feature that was varied.
    pub independent: String,
    /// Grid value the feature was fixed at.
    pub x: f64,
    /// Mean prediction with the feature fixed at `x`.
    pub mean: f64,
    /// Bootstrap replicate, or `None` for the full-data run.
    pub boot: Option<usize>,
}

/// Normalised swing of one feature within a (replicate, period, model) group.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingRecord {
    /// Feature the swing belongs to.
    pub independent: String,
    /// Range of the feature's dependence curve over the group's summed ranges.
    pub swing: f64,
    /// Fitted family.
    pub model: ModelFamily,
    /// Response period.
    pub dependent: ResponsePeriod,
    /// Bootstrap replicate, or `None` for the full-data run.
    pub boot: Option<usize>,
}

/// A unit of work that failed without aborting its batch.
#[derive(Debug)]
pub struct TrialFailure {
    /// Identifier of the failed unit, e.g. a trial index or `gbrf/lst_day_mean`.
    pub unit: String,
    /// Why it failed.
    pub error: EvalError,
}

/// Records from the units that succeeded plus the units that failed.
#[derive(Debug)]
pub struct BatchReport<R> {
    /// Records from successful units, in unit order.
    pub records: Vec<R>,
    /// Failed units, in unit order.
    pub failures: Vec<TrialFailure>,
}

impl<R> BatchReport<R> {
    /// An empty report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Append another report's records and failures.
    pub fn merge(&mut self, other: BatchReport<R>) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }

    /// `true` when no unit failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<R> Default for BatchReport<R> {
    fn default() -> Self {
        Self::new()
    }
}
