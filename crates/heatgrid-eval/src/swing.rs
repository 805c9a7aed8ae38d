//! Swing importance: how much of a model's dependence range each feature owns.

use std::collections::BTreeMap;

use heatgrid_models::ModelFamily;
use tracing::warn;

use crate::record::{PdRecord, ResponsePeriod, SwingRecord};

type GroupKey = (Option<usize>, ResponsePeriod, ModelFamily);

/// Normalised swing per feature from partial-dependence records.
///
/// Records are grouped by (replicate, period, model). Within a group a
/// feature's range is the spread of its curve means; its swing is that
/// range over the sum of ranges in the group, so swings in a group sum to
/// one. A group whose ranges sum to zero gets NaN swings and a warning.
/// Output is ordered by group, then by first appearance of each feature.
#[must_use]
pub fn compute_swing(records: &[PdRecord]) -> Vec<SwingRecord> {
    let mut groups: BTreeMap<GroupKey, Vec<(String, f64, f64)>> = BTreeMap::new();
    for record in records {
        let features = groups
            .entry((record.boot, record.dependent, record.model))
            .or_default();
        match features.iter_mut().find(|(name, _, _)| name == &record.independent) {
            Some((_, lo, hi)) => {
                *lo = lo.min(record.mean);
                *hi = hi.max(record.mean);
            }
            None => features.push((record.independent.clone(), record.mean, record.mean)),
        }
    }

    let mut swings = Vec::new();
    for ((boot, dependent, model), features) in groups {
        let total: f64 = features.iter().map(|(_, lo, hi)| hi - lo).sum();
        let degenerate = !(total > 0.0 && total.is_finite());
        if degenerate {
            warn!(%model, %dependent, ?boot, total, "dependence ranges sum to zero; swing undefined");
        }
        swings.extend(features.into_iter().map(|(independent, lo, hi)| SwingRecord {
            independent,
            swing: if degenerate { f64::NAN } else { (hi - lo) / total },
            model,
            dependent,
            boot,
        }));
    }
    swings
}
