use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_db_time},
    models::PeerRegistration,
};

fn row_to_peer(row: &Row) -> Result<PeerRegistration> {
    let last_updated: String = row.get("last_updated")?;
    let port: i64 = row.get("port_number")?;

    Ok(PeerRegistration {
        scheme: row.get("scheme")?,
        host: row.get("api_endpoint")?,
        port: u16::try_from(port).with_context(|| format!("port_number {port} out of range"))?,
        last_updated: parse_datetime(&last_updated, "last_updated")?,
    })
}

impl Database {
    /// Insert-or-refresh keyed by `(scheme, api_endpoint)`.
    pub async fn upsert_peer(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        at: DateTime<Utc>,
    ) -> Result<PeerRegistration> {
        let scheme = scheme.to_string();
        let host = host.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO organizations (scheme, api_endpoint, port_number, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (scheme, api_endpoint) DO UPDATE
                 SET port_number = excluded.port_number,
                     last_updated = excluded.last_updated
                 RETURNING scheme, api_endpoint, port_number, last_updated",
            )?;
            let mut rows = stmt.query(params![scheme, host, port, to_db_time(at)])?;
            let row = rows
                .next()?
                .with_context(|| format!("upsert of {scheme}://{host} returned no row"))?;
            row_to_peer(row)
        })
        .await
    }

    pub async fn list_peers(&self) -> Result<Vec<PeerRegistration>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT scheme, api_endpoint, port_number, last_updated
                 FROM organizations
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut peers = Vec::new();
            while let Some(row) = rows.next()? {
                peers.push(row_to_peer(row)?);
            }
            Ok(peers)
        })
        .await
    }

    /// Deletes every peer last refreshed before `cutoff` in one statement and
    /// returns the removed base hosts as `scheme://api_endpoint`.
    pub async fn delete_peers_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "DELETE FROM organizations
                 WHERE last_updated < ?1
                 RETURNING scheme, api_endpoint",
            )?;
            let mut rows = stmt.query(params![to_db_time(cutoff)])?;
            let mut removed = Vec::new();
            while let Some(row) = rows.next()? {
                let scheme: String = row.get(0)?;
                let host: String = row.get(1)?;
                removed.push(format!("{scheme}://{host}"));
            }
            Ok(removed)
        })
        .await
    }
}
