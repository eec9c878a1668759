//! The assignment ledger: version transitions and temporal queries.
//!
//! All writes run inside a single redb write transaction. redb serializes
//! write transactions, so the Update critical section (read the open
//! version, close it, insert the successor) is exclusive end to end and a
//! reader can never observe a chain with zero or two open versions.

use chrono::{DateTime, NaiveDate, Utc};
use redb::{Database, ReadableDatabase};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::record::{
    Assignment, AssignmentPatch, AssignmentWithWorker, ChainId, NewAssignment, OrgEntry, Worker,
    WorkerId, INFINITY_DATE, INFINITY_DATETIME,
};
use crate::{store, validate, Result};

/// Bi-temporal assignment ledger.
///
/// An embedded, serverless store where versioned resource assignments are
/// the core primitive. All writes are ACID (backed by `redb`). The database
/// file uses the `.tidemark` extension by convention.
///
/// The handle is `Send + Sync`; share it across threads with `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use tidemark::AssignmentLedger;
///
/// let db = AssignmentLedger::open("assignments.tidemark").unwrap();
/// let created = db
///     .create_assignment("alice", "Platform", "engineer", "2024-01-01".parse().unwrap())
///     .unwrap();
/// let current = db.open_assignments().unwrap();
/// assert_eq!(current.len(), 1);
/// assert_eq!(current[0].assignment.chain_id, created.chain_id);
/// ```
pub struct AssignmentLedger {
    db: Database,
    /// Sampled exactly once per operation, so each create/update/query
    /// works against one coherent instant.
    clock: Box<dyn Clock>,
}

impl AssignmentLedger {
    /// Open or create a ledger at the given path.
    ///
    /// The file will be created if it does not exist; all tables exist
    /// after a successful open, so no separate bootstrap step is needed.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_clock(path, Box::new(SystemClock))
    }

    /// [`open`](Self::open) with an injected time source.
    pub fn open_with_clock(path: &str, clock: Box<dyn Clock>) -> Result<Self> {
        let db = Database::create(path)?;
        debug!(path, "opened assignment ledger");
        Self::init(db, clock)
    }

    /// Create an in-memory ledger (no file I/O).
    ///
    /// Useful for testing and ephemeral workloads; data is lost when the
    /// instance is dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_clock(Box::new(SystemClock))
    }

    /// [`open_in_memory`](Self::open_in_memory) with an injected time source.
    pub fn open_in_memory_with_clock(clock: Box<dyn Clock>) -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db, clock)
    }

    fn init(db: Database, clock: Box<dyn Clock>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        store::create_tables(&write_txn)?;
        write_txn.commit()?;
        Ok(Self { db, clock })
    }

    // -----------------------------------------------------------------------
    // Version transitions
    // -----------------------------------------------------------------------

    /// Create a worker and the first version of their assignment chain.
    ///
    /// Version 1 opens both axes at once: business time runs from
    /// `business_start` to [`INFINITY_DATE`], processing time from the
    /// current instant to [`INFINITY_DATETIME`]. The worker row and the
    /// version row commit atomically — either both persist or neither.
    pub fn create_assignment(
        &self,
        name: &str,
        organization: &str,
        worker_type: &str,
        business_start: NaiveDate,
    ) -> Result<NewAssignment> {
        let name = validate::required_str(Some(name), "name")?;
        let organization = validate::required_str(Some(organization), "organization")?;
        let worker_type = validate::required_str(Some(worker_type), "worker_type")?;
        validate::date_range(Some(business_start), Some(INFINITY_DATE), "business")?;

        let now = self.clock.now();
        validate::datetime_range(Some(now), Some(INFINITY_DATETIME), "processing")?;

        let write_txn = self.db.begin_write()?;
        let worker_id = store::next_worker_id(&write_txn)?;
        store::insert_worker(
            &write_txn,
            &Worker {
                worker_id,
                name: name.to_string(),
                organization: organization.to_string(),
                worker_type: worker_type.to_string(),
            },
        )?;
        let chain_id = store::next_chain_id(&write_txn)?;
        store::insert_version(
            &write_txn,
            &Assignment {
                chain_id,
                version: 1,
                worker_id,
                business_start,
                business_end: INFINITY_DATE,
                proc_start: now,
                proc_end: INFINITY_DATETIME,
            },
        )?;
        write_txn.commit()?;

        info!(%worker_id, %chain_id, "created assignment chain");
        Ok(NewAssignment {
            worker_id,
            chain_id,
            version: 1,
        })
    }

    /// Supersede a chain's open version with a corrected one.
    ///
    /// Fields omitted from `patch` are carried forward from the current
    /// open version. The current version's `proc_end` is set to the update
    /// instant and version `k+1` opens at exactly that instant, so the
    /// chain's processing intervals tile with no gap or overlap. Returns
    /// the new open version.
    ///
    /// An empty patch is accepted and records a new version with an
    /// unchanged business range; callers that require at least one field
    /// should check [`AssignmentPatch::is_empty`] first.
    ///
    /// On any validation failure nothing changes: the transaction is
    /// dropped unclosed, which rolls it back.
    pub fn update_assignment(&self, chain_id: ChainId, patch: AssignmentPatch) -> Result<Assignment> {
        let write_txn = self.db.begin_write()?;

        let current = {
            let table = write_txn.open_table(store::ASSIGNMENTS)?;
            store::open_version(&table, chain_id)?
        };

        let (business_start, business_end) = patch.merge(&current);
        validate::date_range(Some(business_start), Some(business_end), "business")?;

        let closed_at = self.clock.now();
        // A clock that ran backwards would close the current version before
        // it opened, violating proc_start <= proc_end.
        validate::datetime_range(Some(current.proc_start), Some(closed_at), "processing")?;
        validate::datetime_range(Some(closed_at), Some(INFINITY_DATETIME), "processing")?;

        store::close_version(&write_txn, chain_id, current.version, closed_at)?;
        let next = Assignment {
            chain_id,
            version: current.version + 1,
            worker_id: current.worker_id,
            business_start,
            business_end,
            proc_start: closed_at,
            proc_end: INFINITY_DATETIME,
        };
        store::insert_version(&write_txn, &next)?;
        write_txn.commit()?;

        info!(%chain_id, version = next.version, "superseded assignment version");
        Ok(next)
    }

    // -----------------------------------------------------------------------
    // Temporal queries
    // -----------------------------------------------------------------------

    /// Assignments that are both current (open processing time) and
    /// business-effective today. "Today" comes from the injected clock,
    /// evaluated once per call.
    pub fn active_assignments(&self) -> Result<Vec<AssignmentWithWorker>> {
        let today = self.clock.now().date_naive();
        self.filtered_join(|a| a.is_open() && a.effective_on(today))
    }

    /// Every chain's current version, regardless of business-effective
    /// dating.
    pub fn open_assignments(&self) -> Result<Vec<AssignmentWithWorker>> {
        self.filtered_join(Assignment::is_open)
    }

    /// The general bi-temporal query: what the system believed as of
    /// processing instant `processing_datetime` (default: now) about the
    /// business-effective state on `business_date`.
    ///
    /// Both axes are half-open, so a version whose `business_end` equals
    /// `business_date` is excluded.
    pub fn assignments_as_of(
        &self,
        business_date: NaiveDate,
        processing_datetime: Option<DateTime<Utc>>,
    ) -> Result<Vec<AssignmentWithWorker>> {
        let at = processing_datetime.unwrap_or_else(|| self.clock.now());
        self.filtered_join(|a| a.believed_at(at) && a.effective_on(business_date))
    }

    /// Scan all versions, keep those matching `predicate`, join worker
    /// fields. Results come back in `(chain_id, version)` order.
    ///
    /// A version whose worker row is missing is a referential-integrity
    /// violation and surfaces as `NotFound` rather than being skipped.
    fn filtered_join(
        &self,
        predicate: impl Fn(&Assignment) -> bool,
    ) -> Result<Vec<AssignmentWithWorker>> {
        let read_txn = self.db.begin_read()?;
        let assignments = read_txn.open_table(store::ASSIGNMENTS)?;
        let workers = read_txn.open_table(store::WORKERS)?;

        let mut results = Vec::new();
        for assignment in store::all_versions(&assignments)? {
            if predicate(&assignment) {
                let worker = store::worker(&workers, assignment.worker_id)?;
                results.push(AssignmentWithWorker {
                    assignment,
                    name: worker.name,
                    organization: worker.organization,
                    worker_type: worker.worker_type,
                });
            }
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Inspection reads
    // -----------------------------------------------------------------------

    /// Look up a worker by id.
    pub fn worker(&self, worker_id: WorkerId) -> Result<Worker> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::WORKERS)?;
        store::worker(&table, worker_id)
    }

    /// All workers, ordered by id.
    pub fn workers(&self) -> Result<Vec<Worker>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::WORKERS)?;
        store::workers(&table)
    }

    /// One specific version of a chain.
    pub fn version(&self, chain_id: ChainId, version: u32) -> Result<Assignment> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::ASSIGNMENTS)?;
        store::version(&table, chain_id, version)
    }

    /// A chain's current (open) version.
    pub fn open_version(&self, chain_id: ChainId) -> Result<Assignment> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::ASSIGNMENTS)?;
        store::open_version(&table, chain_id)
    }

    /// Every version of one chain, ascending. Empty for an unknown chain.
    pub fn versions(&self, chain_id: ChainId) -> Result<Vec<Assignment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::ASSIGNMENTS)?;
        store::chain_versions(&table, chain_id)
    }

    /// Every version of every chain, in `(chain_id, version)` order.
    pub fn all_versions(&self) -> Result<Vec<Assignment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::ASSIGNMENTS)?;
        store::all_versions(&table)
    }

    // -----------------------------------------------------------------------
    // Reference data
    // -----------------------------------------------------------------------

    /// Upsert an organization. The engine never checks worker rows against
    /// this table; it exists for seeding and lookup collaborators.
    pub fn put_org(&self, name: &str, parent: Option<&str>) -> Result<()> {
        let name = validate::required_str(Some(name), "name")?;
        let write_txn = self.db.begin_write()?;
        store::put_org(
            &write_txn,
            &OrgEntry {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            },
        )?;
        write_txn.commit()?;
        Ok(())
    }

    /// All organizations, ordered by name.
    pub fn orgs(&self) -> Result<Vec<OrgEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::ORGS)?;
        store::org_rows(&table)
    }

    /// Record a worker type name.
    pub fn put_worker_type(&self, name: &str) -> Result<()> {
        let name = validate::required_str(Some(name), "worker_type")?;
        let write_txn = self.db.begin_write()?;
        store::put_worker_type(&write_txn, name)?;
        write_txn.commit()?;
        Ok(())
    }

    /// All worker type names, ordered.
    pub fn worker_types(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(store::WORKER_TYPES)?;
        store::worker_type_rows(&table)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
