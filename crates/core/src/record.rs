//! Record types: workers, assignment versions, patches, and query results.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Business-time sentinel for "no end": 9999-12-31.
///
/// Stored in place of an unbounded `business_end` so that interval
/// comparisons stay total-order comparable (no `Option` special cases).
pub const INFINITY_DATE: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(d) => d,
    None => unreachable!(),
};

/// Processing-time sentinel for "still current": 9999-12-31T23:59:00Z.
pub const INFINITY_DATETIME: DateTime<Utc> = {
    let time = match NaiveTime::from_hms_opt(23, 59, 0) {
        Some(t) => t,
        None => unreachable!(),
    };
    DateTime::from_naive_utc_and_offset(NaiveDateTime::new(INFINITY_DATE, time), Utc)
};

/// Unique, immutable identifier of a [`Worker`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every version of one assignment chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A worker: identity plus descriptive attributes.
///
/// Created once, never versioned, never deleted in normal operation.
/// `organization` and `worker_type` are informally drawn from the reference
/// tables but the engine treats them as opaque required strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub name: String,
    pub organization: String,
    pub worker_type: String,
}

/// One version in the history of a resource assignment chain.
///
/// # Bi-temporal model
///
/// Each version carries two independent half-open intervals:
///
/// - **Business time** (`business_start` / `business_end`): the calendar
///   period during which the assignment is effective in the world,
///   regardless of when it was recorded. `business_end` is exclusive.
///
/// - **Processing time** (`proc_start` / `proc_end`): the system-clock
///   period during which this version was the recorded truth. An update
///   sets `proc_end` on the old version and appends a new one — so you can
///   ask "what did we *believe* about this assignment on 2024-03-01?"
///   separately from "what was effective on 2024-03-01?"
///
/// Unbounded ends hold [`INFINITY_DATE`] / [`INFINITY_DATETIME`], never a
/// null. The version with `proc_end = INFINITY_DATETIME` is the chain's
/// single open (current) version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Chain this version belongs to; stable for the chain's lifetime.
    pub chain_id: ChainId,
    /// 1-based version number; consecutive within a chain, no gaps.
    pub version: u32,
    /// Owning worker; identical across every version of the chain.
    pub worker_id: WorkerId,
    /// Business-effective start (inclusive).
    pub business_start: NaiveDate,
    /// Business-effective end (exclusive); `INFINITY_DATE` when unbounded.
    pub business_end: NaiveDate,
    /// Instant this version became the recorded truth (inclusive).
    pub proc_start: DateTime<Utc>,
    /// Instant this version stopped being the recorded truth (exclusive);
    /// `INFINITY_DATETIME` while it is the chain's current version.
    pub proc_end: DateTime<Utc>,
}

impl Assignment {
    /// Is this the chain's current (open) version?
    pub fn is_open(&self) -> bool {
        self.proc_end == INFINITY_DATETIME
    }

    /// Is this assignment business-effective on the given date?
    pub fn effective_on(&self, date: NaiveDate) -> bool {
        self.business_start <= date && self.business_end > date
    }

    /// Was this version the recorded truth at the given instant?
    pub fn believed_at(&self, at: DateTime<Utc>) -> bool {
        self.proc_start <= at && self.proc_end > at
    }
}

/// Partial update to a chain's business-time range.
///
/// Omitted fields are carried forward from the current open version
/// (field-level merge, not whole-record overwrite).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub business_start: Option<NaiveDate>,
    pub business_end: Option<NaiveDate>,
}

impl AssignmentPatch {
    /// The effective business range this patch produces against `current`.
    pub fn merge(&self, current: &Assignment) -> (NaiveDate, NaiveDate) {
        (
            self.business_start.unwrap_or(current.business_start),
            self.business_end.unwrap_or(current.business_end),
        )
    }

    /// True when no field is supplied. Boundary layers that require at
    /// least one field can check this before calling the engine.
    pub fn is_empty(&self) -> bool {
        self.business_start.is_none() && self.business_end.is_none()
    }
}

/// Receipt returned by a successful create: the identities minted for the
/// new worker and their first assignment version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub worker_id: WorkerId,
    pub chain_id: ChainId,
    pub version: u32,
}

/// Query result row: an assignment version joined with its worker's
/// descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentWithWorker {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub name: String,
    pub organization: String,
    pub worker_type: String,
}

/// Reference-data entry: an organization and its optional parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgEntry {
    pub name: String,
    pub parent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn sample() -> Assignment {
        Assignment {
            chain_id: ChainId(1),
            version: 1,
            worker_id: WorkerId(1),
            business_start: d("2024-01-01"),
            business_end: d("2024-06-30"),
            proc_start: dt("2024-01-01T09:00:00Z"),
            proc_end: INFINITY_DATETIME,
        }
    }

    #[test]
    fn infinity_sentinels_exceed_any_real_instant() {
        assert!(INFINITY_DATE > d("2999-12-31"));
        assert!(INFINITY_DATETIME > dt("2999-12-31T23:59:59Z"));
        assert_eq!(INFINITY_DATETIME.date_naive(), INFINITY_DATE);
    }

    #[test]
    fn business_interval_is_half_open() {
        let a = sample();
        assert!(a.effective_on(d("2024-01-01")), "start is inclusive");
        assert!(a.effective_on(d("2024-06-29")));
        assert!(!a.effective_on(d("2024-06-30")), "end is exclusive");
        assert!(!a.effective_on(d("2023-12-31")));
    }

    #[test]
    fn processing_interval_is_half_open() {
        let mut a = sample();
        a.proc_end = dt("2024-02-01T00:00:00Z");
        assert!(a.believed_at(dt("2024-01-01T09:00:00Z")));
        assert!(!a.believed_at(dt("2024-02-01T00:00:00Z")));
        assert!(!a.is_open());
    }

    #[test]
    fn patch_merge_carries_forward_omitted_fields() {
        let current = sample();

        let start_only = AssignmentPatch {
            business_start: Some(d("2024-02-01")),
            business_end: None,
        };
        assert_eq!(start_only.merge(&current), (d("2024-02-01"), d("2024-06-30")));

        let end_only = AssignmentPatch {
            business_start: None,
            business_end: Some(d("2024-12-31")),
        };
        assert_eq!(end_only.merge(&current), (d("2024-01-01"), d("2024-12-31")));

        assert!(AssignmentPatch::default().is_empty());
        assert!(!start_only.is_empty());
    }
}
