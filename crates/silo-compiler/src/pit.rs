//! Point-in-time visibility semantics
//!
//! The single place that defines which rows of a joined or aggregated
//! source are visible to a probe at a given "as-of" timestamp. The plan
//! compiler parameterizes physical operators from these rules, and every
//! processor's implementation of those operators must match them
//! bit-for-bit; that shared definition is what makes offline training and
//! online serving produce identical values.
//!
//! Policies (also recorded in DESIGN.md):
//! - Window bounds are open-lower, closed-upper: a probe at `t` over
//!   window `W` sees rows with `ts` in `(t - W, t]`.
//! - Ties on (key, timestamp) break by ingestion sequence, highest wins;
//!   `Value::cmp_total` is the last resort for rows that also share a
//!   sequence.
//! - Aggregations skip null argument values; an effectively empty window
//!   falls back to the function's default (count 0, sum typed zero,
//!   otherwise null).

use silo_core::ast::AggFunc;
use silo_core::error::{CoreError, Result};
use silo_core::types::{DType, Value};

pub use silo_core::plan::{TieBreak, WindowBounds};

/// Event-time and ingestion-order stamp of a candidate row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStamp {
    pub ts: i64,
    pub seq: u64,
}

/// Visibility rule for a temporal join: strictly no future rows
pub fn visible_for_join(ts: i64, as_of: i64) -> bool {
    ts <= as_of
}

/// Visibility rule for a trailing window at `as_of`
pub fn visible_in_window(ts: i64, as_of: i64, window_ms: i64, bounds: WindowBounds) -> bool {
    match bounds {
        WindowBounds::OpenLowerClosedUpper => ts > as_of - window_ms && ts <= as_of,
    }
}

/// Pick the winning candidate for a temporal join: the most recent visible
/// row, ties broken by the declared rule. Returns the index of the winner
/// among the candidates.
pub fn pick_latest(
    candidates: impl IntoIterator<Item = (usize, RowStamp)>,
    tie_break: TieBreak,
) -> Option<usize> {
    let TieBreak::IngestionOrder = tie_break;
    candidates
        .into_iter()
        .max_by_key(|(_, stamp)| (stamp.ts, stamp.seq))
        .map(|(index, _)| index)
}

/// Apply an aggregation function to the visible set.
///
/// `items` carries each row's stamp so `first`/`last` order by
/// (timestamp, sequence); the other functions are order-insensitive.
pub fn accumulate(
    func: AggFunc,
    items: &[(RowStamp, Value)],
    result_dtype: DType,
) -> Result<Value> {
    let present: Vec<&(RowStamp, Value)> =
        items.iter().filter(|(_, value)| !value.is_null()).collect();

    if present.is_empty() {
        return Ok(func.empty_default(result_dtype));
    }

    match func {
        AggFunc::Count => Ok(Value::Int64(present.len() as i64)),

        AggFunc::Sum => match result_dtype {
            DType::Int64 => {
                let mut total = 0i64;
                for (_, value) in &present {
                    total = total.wrapping_add(value.as_i64().ok_or_else(|| {
                        CoreError::TypeError(format!("sum over non-integer {:?}", value))
                    })?);
                }
                Ok(Value::Int64(total))
            }
            DType::Float64 => {
                let mut total = 0.0f64;
                for (_, value) in &present {
                    total += value.as_f64().ok_or_else(|| {
                        CoreError::TypeError(format!("sum over non-numeric {:?}", value))
                    })?;
                }
                Ok(Value::Float64(total))
            }
            other => Err(CoreError::TypeError(format!(
                "sum cannot produce {}",
                other
            ))),
        },

        AggFunc::Avg => {
            let mut total = 0.0f64;
            for (_, value) in &present {
                total += value.as_f64().ok_or_else(|| {
                    CoreError::TypeError(format!("avg over non-numeric {:?}", value))
                })?;
            }
            Ok(Value::Float64(total / present.len() as f64))
        }

        AggFunc::Min => Ok(present
            .iter()
            .map(|(_, value)| value)
            .min_by(|a, b| a.cmp_total(b))
            .cloned()
            .unwrap_or(Value::Null)),

        AggFunc::Max => Ok(present
            .iter()
            .map(|(_, value)| value)
            .max_by(|a, b| a.cmp_total(b))
            .cloned()
            .unwrap_or(Value::Null)),

        AggFunc::First => Ok(present
            .iter()
            .min_by_key(|(stamp, _)| (stamp.ts, stamp.seq))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)),

        AggFunc::Last => Ok(present
            .iter()
            .max_by_key(|(stamp, _)| (stamp.ts, stamp.seq))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)),
    }
}

/// Bounded out-of-order admission.
///
/// A row whose timestamp trails the maximum timestamp already seen by more
/// than the tolerance is excluded and counted, never an error. With no
/// tolerance configured every row is admitted.
#[derive(Debug)]
pub struct LatenessTracker {
    watermark_ms: Option<i64>,
    max_ts: i64,
    dropped: u64,
}

impl LatenessTracker {
    pub fn new(watermark_ms: Option<i64>) -> Self {
        Self {
            watermark_ms,
            max_ts: i64::MIN,
            dropped: 0,
        }
    }

    /// Admit or drop a row arriving with the given event timestamp, in
    /// ingestion order
    pub fn admit(&mut self, ts: i64) -> bool {
        match self.watermark_ms {
            None => {
                self.max_ts = self.max_ts.max(ts);
                true
            }
            Some(tolerance) => {
                if self.max_ts != i64::MIN && ts < self.max_ts - tolerance {
                    self.dropped += 1;
                    return false;
                }
                self.max_ts = self.max_ts.max(ts);
                true
            }
        }
    }

    /// Rows dropped as too late so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
