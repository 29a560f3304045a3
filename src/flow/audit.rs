//! Append-only record of committed mutations.
//!
//! Entries are written inside the mutation's own transaction, so a rolled
//! back batch leaves no trace here.

use crate::error::Result;
use crate::flow::catalog::now;
use crate::flow::models::AuditEntry;
use rusqlite::{params, Connection};

/// Where an audited mutation happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditScope<'a> {
    /// Flow touched, if any.
    pub flow_id: Option<&'a str>,
    /// Status bucket touched, if any.
    pub status_id: Option<&'a str>,
    /// Edge or task the entry is about.
    pub subject_id: Option<&'a str>,
}

/// Append one entry.
pub fn record(
    conn: &Connection,
    operation: &str,
    scope: AuditScope<'_>,
    details: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (timestamp, operation, flow_id, status_id, subject_id, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![now(), operation, scope.flow_id, scope.status_id, scope.subject_id, details],
    )?;
    Ok(())
}

/// Read entries newest first, optionally restricted to one subject, flow or
/// status id.
pub fn query(conn: &Connection, subject: Option<&str>, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, operation, flow_id, status_id, subject_id, details
         FROM audit_log
         WHERE ?1 IS NULL OR subject_id = ?1 OR flow_id = ?1 OR status_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![subject, limit], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                operation: row.get(2)?,
                flow_id: row.get(3)?,
                status_id: row.get(4)?,
                subject_id: row.get(5)?,
                details: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::schema;

    #[test]
    fn test_record_and_query() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();

        let edge = AuditScope { flow_id: Some("f1"), subject_id: Some("e1"), ..Default::default() };
        record(&conn, "create_edge", edge, None).unwrap();
        let bucket = AuditScope { status_id: Some("todo"), ..Default::default() };
        record(&conn, "reorder", bucket, Some("[\"a\",\"b\"]")).unwrap();

        let all = query(&conn, None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].operation, "reorder");
        assert_eq!(all[1].subject_id.as_deref(), Some("e1"));

        let by_flow = query(&conn, Some("f1"), None).unwrap();
        assert_eq!(by_flow.len(), 1);
        assert_eq!(query(&conn, None, Some(1)).unwrap().len(), 1);
    }
}
