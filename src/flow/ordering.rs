//! Per-status position ordering.
//!
//! A status bucket is loaded into a [`Bucket`] (status id plus the member
//! task ids in position order), edited in memory, and written back so that
//! member `i` holds position `i`. Every edit happens inside one transaction,
//! so readers only ever see dense `0..k` sequences.

use crate::error::{Entity, Error, Result};
use crate::flow::catalog::{self, parse_task, TASK_COLUMNS};
use crate::flow::models::{OrderingReport, TaskNode};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashSet};

fn to_position(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

/// Map a client-supplied (possibly negative) target position to an index.
///
/// Negative values become 0; the upper end is clamped later against the
/// destination's size.
#[must_use]
pub fn target_index(position: i64) -> usize {
    usize::try_from(position.max(0)).unwrap_or(usize::MAX)
}

/// The ordered membership of one status bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    status_id: String,
    members: Vec<String>,
}

impl Bucket {
    /// A bucket with the given members, first member at position 0.
    pub fn new(status_id: impl Into<String>, members: Vec<String>) -> Self {
        Self { status_id: status_id.into(), members }
    }

    /// Load a bucket's current membership.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the status does not exist.
    pub fn load(conn: &Connection, status_id: &str) -> Result<Self> {
        catalog::require_status(conn, status_id)?;
        let mut stmt =
            conn.prepare("SELECT id FROM tasks WHERE status_id = ?1 ORDER BY position ASC")?;
        let members =
            stmt.query_map(params![status_id], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
        Ok(Self::new(status_id, members))
    }

    /// The bucket's status id.
    #[must_use]
    pub fn status_id(&self) -> &str {
        &self.status_id
    }

    /// Member ids in position order.
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the bucket has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Position of a member, if present.
    #[must_use]
    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m == task_id)
    }

    /// Append a member and return its position.
    pub fn push(&mut self, task_id: impl Into<String>) -> usize {
        self.members.push(task_id.into());
        self.members.len() - 1
    }

    /// Remove a member, closing the gap. Returns the position it held.
    pub fn remove(&mut self, task_id: &str) -> Option<usize> {
        let index = self.position_of(task_id)?;
        self.members.remove(index);
        Some(index)
    }

    /// Insert a member at `target`, clamped to `[0, len]`. Returns the
    /// position it landed at.
    pub fn insert(&mut self, task_id: impl Into<String>, target: usize) -> usize {
        let index = target.min(self.members.len());
        self.members.insert(index, task_id.into());
        index
    }

    /// Replace the order with `ordered`, which must list every member
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on duplicates or omitted members, and
    /// `NotFound` if an id is not a member of this bucket.
    pub fn permute(&mut self, ordered: &[String]) -> Result<()> {
        let current: HashSet<&str> = self.members.iter().map(String::as_str).collect();
        let mut seen = HashSet::with_capacity(ordered.len());

        for id in ordered {
            if !seen.insert(id.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "task {id} listed more than once in reorder of {}",
                    self.status_id
                )));
            }
            if !current.contains(id.as_str()) {
                return Err(Error::not_found(
                    Entity::Task,
                    format!("{id} (in status {})", self.status_id),
                ));
            }
        }

        if seen.len() != current.len() {
            let missing: Vec<&str> =
                self.members.iter().map(String::as_str).filter(|m| !seen.contains(m)).collect();
            return Err(Error::InvalidArgument(format!(
                "reorder of {} must list every member; missing: {}",
                self.status_id,
                missing.join(", ")
            )));
        }

        self.members = ordered.to_vec();
        Ok(())
    }
}

/// Persist buckets so that every member sits at its index.
///
/// Rewritten rows are first parked at distinct negative positions, then
/// given their final positions, so the unique `(status_id, position)` index
/// holds after every statement. A task appearing in a bucket it was not
/// stored in is moved there.
///
/// Every bucket must have been loaded in the current transaction and no
/// task may appear in two buckets.
pub fn write_back(conn: &Connection, buckets: &[&Bucket]) -> Result<()> {
    let mut park = conn.prepare("UPDATE tasks SET status_id = ?1, position = ?2 WHERE id = ?3")?;
    let mut parked: i64 = 0;
    for bucket in buckets {
        for id in &bucket.members {
            parked -= 1;
            park.execute(params![&bucket.status_id, parked, id])?;
        }
    }

    let mut place = conn.prepare("UPDATE tasks SET position = ?1 WHERE id = ?2")?;
    for bucket in buckets {
        for (index, id) in bucket.members.iter().enumerate() {
            place.execute(params![to_position(index), id])?;
        }
    }
    Ok(())
}

/// Position a newly appended member of `status_id` would get.
pub fn next_position(conn: &Connection, status_id: &str) -> Result<i64> {
    let position = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks WHERE status_id = ?1",
        params![status_id],
        |row| row.get(0),
    )?;
    Ok(position)
}

/// Task ids of a bucket in position order.
///
/// # Errors
///
/// Returns `NotFound` if the status does not exist.
pub fn list_ordered(conn: &Connection, status_id: &str) -> Result<Vec<String>> {
    Ok(Bucket::load(conn, status_id)?.members)
}

/// Full task records of a bucket in position order.
pub fn list_tasks(conn: &Connection, status_id: &str) -> Result<Vec<TaskNode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE status_id = ?1 ORDER BY position ASC"
    ))?;
    let tasks = stmt.query_map(params![status_id], parse_task)?.collect::<rusqlite::Result<_>>()?;
    Ok(tasks)
}

/// Replace a bucket's order with exactly `ordered`.
///
/// # Errors
///
/// See [`Bucket::permute`]; also `NotFound` if the status does not exist.
pub fn reorder(conn: &Connection, status_id: &str, ordered: &[String]) -> Result<Vec<TaskNode>> {
    let mut bucket = Bucket::load(conn, status_id)?;
    bucket.permute(ordered)?;
    write_back(conn, &[&bucket])?;
    list_tasks(conn, status_id)
}

/// Move a task from one bucket to a position in another (or the same) one.
///
/// `target` is clamped to the destination's size after the task has left
/// its origin; `None` appends.
///
/// # Errors
///
/// Returns `NotFound` if the task or either status does not exist, if the
/// task is not currently in `from_status_id`, or if the destination belongs
/// to another project.
pub fn move_task(
    conn: &Connection,
    task_id: &str,
    from_status_id: &str,
    to_status_id: &str,
    target: Option<usize>,
) -> Result<TaskNode> {
    let task = catalog::require_task(conn, task_id)?;
    let destination = catalog::require_status(conn, to_status_id)?;
    if destination.project_id != task.project_id {
        return Err(Error::not_found(
            Entity::Status,
            format!("{to_status_id} (in project {})", task.project_id),
        ));
    }

    let mut origin = Bucket::load(conn, from_status_id)?;
    if origin.remove(task_id).is_none() {
        return Err(Error::not_found(Entity::Task, format!("{task_id} (in status {from_status_id})")));
    }

    if from_status_id == to_status_id {
        let at = target.unwrap_or(origin.len());
        origin.insert(task_id, at);
        write_back(conn, &[&origin])?;
    } else {
        let mut dest = Bucket::load(conn, to_status_id)?;
        let at = target.unwrap_or(dest.len());
        dest.insert(task_id, at);
        write_back(conn, &[&origin, &dest])?;
    }

    catalog::require_task(conn, task_id)
}

/// Check the dense-position invariant of a bucket.
///
/// # Errors
///
/// Returns `NotFound` if the status does not exist.
pub fn check(conn: &Connection, status_id: &str) -> Result<OrderingReport> {
    catalog::require_status(conn, status_id)?;
    let mut stmt = conn.prepare("SELECT position FROM tasks WHERE status_id = ?1")?;
    let positions: Vec<i64> =
        stmt.query_map(params![status_id], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for p in &positions {
        *counts.entry(*p).or_default() += 1;
    }

    let members = positions.len();
    let gaps = (0..to_position(members)).filter(|p| !counts.contains_key(p)).collect();
    let duplicates = counts.iter().filter(|(_, n)| **n > 1).map(|(p, _)| *p).collect();

    Ok(OrderingReport { status_id: status_id.to_string(), members, gaps, duplicates })
}
