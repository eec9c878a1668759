//! Persistence layer: redb tables, in-transaction write helpers, and read
//! helpers. No business rules live here — only row access and the two
//! integrity checks the store itself owns (duplicate insert, double close).
//!
//! Write helpers take a [`redb::WriteTransaction`] owned by the caller, so
//! the transition engine can compose several writes into one atomic
//! transaction (dropping the transaction on error is an implicit rollback).
//! Read helpers are generic over [`ReadableTable`] so they work against
//! both read transactions and an uncommitted write transaction.

use redb::{ReadableTable, TableDefinition, WriteTransaction};

use crate::record::{Assignment, ChainId, OrgEntry, Worker, WorkerId};
use crate::{Result, TidemarkError};

/// worker_id → Worker JSON.
pub(crate) const WORKERS: TableDefinition<u64, &str> = TableDefinition::new("workers");
/// (chain_id, version) → Assignment JSON.
///
/// Tuple keys sort component-wise, so one chain's versions are contiguous
/// and version-ordered under a plain range scan.
pub(crate) const ASSIGNMENTS: TableDefinition<(u64, u32), &str> =
    TableDefinition::new("assignments");
/// Identity counters (the embedded analog of a database sequence).
pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
/// org name → OrgEntry JSON. Reference data, not versioned.
pub(crate) const ORGS: TableDefinition<&str, &str> = TableDefinition::new("orgs");
/// Set of known worker type names. Reference data, not versioned.
pub(crate) const WORKER_TYPES: TableDefinition<&str, ()> = TableDefinition::new("worker_types");

const WORKER_ID_COUNTER: &str = "worker_id";
const CHAIN_ID_COUNTER: &str = "chain_id";

/// Open every table so it exists in the committed schema.
pub(crate) fn create_tables(txn: &WriteTransaction) -> Result<()> {
    txn.open_table(WORKERS)?;
    txn.open_table(ASSIGNMENTS)?;
    txn.open_table(COUNTERS)?;
    txn.open_table(ORGS)?;
    txn.open_table(WORKER_TYPES)?;
    Ok(())
}

/// Increment a named counter and return its new value (first call → 1).
///
/// The increment commits with the caller's transaction, so an id is only
/// consumed if the row that uses it is persisted too, and no two committed
/// callers can observe the same value.
fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64> {
    let mut table = txn.open_table(COUNTERS)?;
    // Extract the current value as owned before the insert so the
    // AccessGuard borrow on `table` is released.
    let current: u64 = table.get(counter)?.map(|g| g.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(counter, next)?;
    Ok(next)
}

pub(crate) fn next_worker_id(txn: &WriteTransaction) -> Result<WorkerId> {
    Ok(WorkerId(next_id(txn, WORKER_ID_COUNTER)?))
}

pub(crate) fn next_chain_id(txn: &WriteTransaction) -> Result<ChainId> {
    Ok(ChainId(next_id(txn, CHAIN_ID_COUNTER)?))
}

pub(crate) fn insert_worker(txn: &WriteTransaction, worker: &Worker) -> Result<()> {
    let row = serde_json::to_string(worker)?;
    let mut table = txn.open_table(WORKERS)?;
    table.insert(worker.worker_id.0, row.as_str())?;
    Ok(())
}

/// Insert one assignment version; fails with [`TidemarkError::DuplicateVersion`]
/// if the `(chain, version)` key is already present.
pub(crate) fn insert_version(txn: &WriteTransaction, assignment: &Assignment) -> Result<()> {
    let row = serde_json::to_string(assignment)?;
    let mut table = txn.open_table(ASSIGNMENTS)?;
    // `insert` returns the previous value; a collision means an upstream
    // concurrency-control failure. The caller drops the transaction, so
    // the overwrite never commits.
    let previous = table.insert((assignment.chain_id.0, assignment.version), row.as_str())?;
    if previous.is_some() {
        return Err(TidemarkError::DuplicateVersion {
            chain: assignment.chain_id,
            version: assignment.version,
        });
    }
    Ok(())
}

/// Set `proc_end` on exactly one open row.
///
/// Fails with [`TidemarkError::NotFound`] if the row does not exist or was
/// already closed — a double-close is a programming error and must surface,
/// not be silently ignored.
pub(crate) fn close_version(
    txn: &WriteTransaction,
    chain: ChainId,
    version: u32,
    proc_end: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let mut table = txn.open_table(ASSIGNMENTS)?;
    let row: Option<String> = table
        .get((chain.0, version))?
        .map(|g| g.value().to_string());
    let Some(row) = row else {
        return Err(TidemarkError::NotFound(format!(
            "version {version} of chain {chain}"
        )));
    };
    let mut assignment: Assignment = serde_json::from_str(&row)?;
    if !assignment.is_open() {
        return Err(TidemarkError::NotFound(format!(
            "open version {version} of chain {chain} (already closed)"
        )));
    }
    assignment.proc_end = proc_end;
    let updated = serde_json::to_string(&assignment)?;
    table.insert((chain.0, version), updated.as_str())?;
    Ok(())
}

pub(crate) fn put_org(txn: &WriteTransaction, entry: &OrgEntry) -> Result<()> {
    let row = serde_json::to_string(entry)?;
    let mut table = txn.open_table(ORGS)?;
    table.insert(entry.name.as_str(), row.as_str())?;
    Ok(())
}

pub(crate) fn put_worker_type(txn: &WriteTransaction, name: &str) -> Result<()> {
    let mut table = txn.open_table(WORKER_TYPES)?;
    table.insert(name, ())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

pub(crate) fn worker<T>(table: &T, id: WorkerId) -> Result<Worker>
where
    T: ReadableTable<u64, &'static str>,
{
    let row: Option<String> = table.get(id.0)?.map(|g| g.value().to_string());
    match row {
        Some(row) => Ok(serde_json::from_str(&row)?),
        None => Err(TidemarkError::NotFound(format!("worker {id}"))),
    }
}

pub(crate) fn workers<T>(table: &T) -> Result<Vec<Worker>>
where
    T: ReadableTable<u64, &'static str>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_k, v) = entry?;
        out.push(serde_json::from_str(v.value())?);
    }
    Ok(out)
}

pub(crate) fn version<T>(table: &T, chain: ChainId, version: u32) -> Result<Assignment>
where
    T: ReadableTable<(u64, u32), &'static str>,
{
    let row: Option<String> = table
        .get((chain.0, version))?
        .map(|g| g.value().to_string());
    match row {
        Some(row) => Ok(serde_json::from_str(&row)?),
        None => Err(TidemarkError::NotFound(format!(
            "version {version} of chain {chain}"
        ))),
    }
}

/// The chain's single version with `proc_end = INFINITY_DATETIME`.
pub(crate) fn open_version<T>(table: &T, chain: ChainId) -> Result<Assignment>
where
    T: ReadableTable<(u64, u32), &'static str>,
{
    for assignment in chain_versions(table, chain)? {
        if assignment.is_open() {
            return Ok(assignment);
        }
    }
    Err(TidemarkError::NotFound(format!(
        "open version of chain {chain}"
    )))
}

/// Every version of one chain, ascending by version number (key order).
/// Empty when the chain is unknown.
pub(crate) fn chain_versions<T>(table: &T, chain: ChainId) -> Result<Vec<Assignment>>
where
    T: ReadableTable<(u64, u32), &'static str>,
{
    let mut out = Vec::new();
    for entry in table.range((chain.0, u32::MIN)..=(chain.0, u32::MAX))? {
        let (_k, v) = entry?;
        out.push(serde_json::from_str(v.value())?);
    }
    Ok(out)
}

/// Every version of every chain, in `(chain_id, version)` order.
pub(crate) fn all_versions<T>(table: &T) -> Result<Vec<Assignment>>
where
    T: ReadableTable<(u64, u32), &'static str>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_k, v) = entry?;
        out.push(serde_json::from_str(v.value())?);
    }
    Ok(out)
}

/// All organizations, ordered by name (key order).
pub(crate) fn org_rows<T>(table: &T) -> Result<Vec<OrgEntry>>
where
    T: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_k, v) = entry?;
        out.push(serde_json::from_str(v.value())?);
    }
    Ok(out)
}

/// All worker type names, ordered (key order).
pub(crate) fn worker_type_rows<T>(table: &T) -> Result<Vec<String>>
where
    T: ReadableTable<&'static str, ()>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (k, _v) = entry?;
        out.push(k.value().to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{INFINITY_DATE, INFINITY_DATETIME};
    use chrono::{DateTime, Utc};
    use redb::{Database, ReadableDatabase};

    fn mem_db() -> Database {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend).unwrap();
        let txn = db.begin_write().unwrap();
        create_tables(&txn).unwrap();
        txn.commit().unwrap();
        db
    }

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn sample_version(chain: u64, version: u32) -> Assignment {
        Assignment {
            chain_id: ChainId(chain),
            version,
            worker_id: WorkerId(1),
            business_start: "2024-01-01".parse().unwrap(),
            business_end: INFINITY_DATE,
            proc_start: dt("2024-01-01T09:00:00Z"),
            proc_end: INFINITY_DATETIME,
        }
    }

    #[test]
    fn counters_are_monotonic_and_independent() {
        let db = mem_db();

        let txn = db.begin_write().unwrap();
        let w1 = next_worker_id(&txn).unwrap();
        let w2 = next_worker_id(&txn).unwrap();
        let c1 = next_chain_id(&txn).unwrap();
        txn.commit().unwrap();

        assert_eq!(w1, WorkerId(1));
        assert_eq!(w2, WorkerId(2));
        assert_eq!(c1, ChainId(1), "chain ids are a separate sequence");

        let txn = db.begin_write().unwrap();
        assert_eq!(next_worker_id(&txn).unwrap(), WorkerId(3));
        txn.commit().unwrap();
    }

    #[test]
    fn duplicate_version_insert_is_rejected() {
        let db = mem_db();

        let txn = db.begin_write().unwrap();
        insert_version(&txn, &sample_version(1, 1)).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_write().unwrap();
        let err = insert_version(&txn, &sample_version(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            TidemarkError::DuplicateVersion {
                chain: ChainId(1),
                version: 1
            }
        ));
        drop(txn); // rollback

        // The original row is untouched.
        let read = db.begin_read().unwrap();
        let table = read.open_table(ASSIGNMENTS).unwrap();
        let stored = version(&table, ChainId(1), 1).unwrap();
        assert_eq!(stored, sample_version(1, 1));
    }

    #[test]
    fn close_version_rejects_missing_row_and_double_close() {
        let db = mem_db();
        let closed_at = dt("2024-02-01T00:00:00Z");

        let txn = db.begin_write().unwrap();
        let err = close_version(&txn, ChainId(9), 1, closed_at).unwrap_err();
        assert!(matches!(err, TidemarkError::NotFound(_)));
        drop(txn);

        let txn = db.begin_write().unwrap();
        insert_version(&txn, &sample_version(1, 1)).unwrap();
        close_version(&txn, ChainId(1), 1, closed_at).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_write().unwrap();
        let err = close_version(&txn, ChainId(1), 1, closed_at).unwrap_err();
        assert!(
            matches!(err, TidemarkError::NotFound(ref msg) if msg.contains("already closed")),
            "double close must be detected, got {err:?}"
        );
    }

    #[test]
    fn chain_versions_scan_is_bounded_to_one_chain() {
        let db = mem_db();

        let txn = db.begin_write().unwrap();
        insert_version(&txn, &sample_version(1, 1)).unwrap();
        insert_version(&txn, &sample_version(1, 2)).unwrap();
        insert_version(&txn, &sample_version(2, 1)).unwrap();
        txn.commit().unwrap();

        let read = db.begin_read().unwrap();
        let table = read.open_table(ASSIGNMENTS).unwrap();

        let chain1 = chain_versions(&table, ChainId(1)).unwrap();
        assert_eq!(
            chain1.iter().map(|a| a.version).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(chain1.iter().all(|a| a.chain_id == ChainId(1)));

        assert!(chain_versions(&table, ChainId(3)).unwrap().is_empty());
        assert_eq!(all_versions(&table).unwrap().len(), 3);
    }
}
