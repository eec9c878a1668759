//! Tidemark — embedded bi-temporal ledger for worker resource assignments.
//!
//! The core primitive is an [`Assignment`]: one version in the history of a
//! resource assignment "chain", carrying two independent time axes.
//!
//! **Business time** (`business_start` / `business_end`) captures when the
//! assignment is effective *in the world*. **Processing time** (`proc_start` /
//! `proc_end`) captures when this version was the system's recorded truth.
//! Corrections never mutate history: an update closes the open version and
//! appends a new one, so "what did we believe on date X" stays reproducible.
//!
//! Unbounded ends use fixed far-future sentinels ([`INFINITY_DATE`],
//! [`INFINITY_DATETIME`]) rather than `Option`, keeping every interval
//! comparison a plain total-order comparison.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tidemark::{AssignmentLedger, AssignmentPatch};
//!
//! let db = AssignmentLedger::open("assignments.tidemark").unwrap();
//!
//! // Create a worker and the first version of their assignment chain
//! let created = db
//!     .create_assignment("alice", "Platform", "engineer", "2024-01-01".parse().unwrap())
//!     .unwrap();
//!
//! // Correct the business-effective end date (closes v1, opens v2)
//! let patch = AssignmentPatch {
//!     business_end: Some("2024-06-30".parse().unwrap()),
//!     ..Default::default()
//! };
//! db.update_assignment(created.chain_id, patch).unwrap();
//!
//! // Bi-temporal point query: effective on a date, as believed at a time
//! let rows = db
//!     .assignments_as_of("2024-03-15".parse().unwrap(), None)
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

mod clock;
mod ledger;
mod record;
mod store;
pub mod validate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::AssignmentLedger;
pub use record::{
    Assignment, AssignmentPatch, AssignmentWithWorker, ChainId, NewAssignment, OrgEntry, Worker,
    WorkerId, INFINITY_DATE, INFINITY_DATETIME,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TidemarkError {
    /// A required input was absent or empty. Caller-correctable; nothing
    /// was persisted.
    #[error("missing required field: {0}")]
    MissingField(String),
    /// Start-after-end on one of the time axes. Rejected before any mutation.
    #[error("invalid {0} range: start must not be after end")]
    RangeInvalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// An insert collided with an existing `(chain, version)` row. Under the
    /// serialized-writer discipline this cannot happen; if it does, the
    /// operation is abandoned rather than retried with the same number.
    #[error("version {version} of chain {chain} already exists")]
    DuplicateVersion { chain: ChainId, version: u32 },
    /// A concurrent update raced this one. Not produced by the redb backend
    /// (writers are fully serialized); kept in the taxonomy so callers can
    /// write backend-agnostic retry logic.
    #[error("concurrent update conflict on chain {0}")]
    Conflict(ChainId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redb::DatabaseError> for TidemarkError {
    fn from(e: redb::DatabaseError) -> Self {
        TidemarkError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for TidemarkError {
    fn from(e: redb::TransactionError) -> Self {
        TidemarkError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for TidemarkError {
    fn from(e: redb::TableError) -> Self {
        TidemarkError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for TidemarkError {
    fn from(e: redb::StorageError) -> Self {
        TidemarkError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for TidemarkError {
    fn from(e: redb::CommitError) -> Self {
        TidemarkError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TidemarkError>;
