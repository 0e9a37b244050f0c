use anyhow::{bail, Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    models::{BeaconProfile, Room},
};
use crate::models::SignalKind;

fn row_to_profile(kind: SignalKind, row: &Row) -> Result<BeaconProfile> {
    Ok(BeaconProfile {
        kind,
        identifier: row.get("identifier")?,
        rssi_threshold: row.get("rssi")?,
        room_id: row.get("room_id")?,
    })
}

impl Database {
    /// All beacons then all access points, each in insertion order.
    pub async fn load_beacon_profiles(&self) -> Result<Vec<BeaconProfile>> {
        self.execute(|conn| {
            let mut profiles = Vec::new();
            for (kind, sql) in [
                (
                    SignalKind::Ble,
                    "SELECT service_uuid AS identifier, rssi, room_id FROM beacons ORDER BY id ASC",
                ),
                (
                    SignalKind::Wifi,
                    "SELECT bssid AS identifier, rssi, room_id FROM wifi_access_points ORDER BY id ASC",
                ),
            ] {
                let mut stmt = conn.prepare(sql)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    profiles.push(row_to_profile(kind, row)?);
                }
            }
            Ok(profiles)
        })
        .await
        .context("failed to load beacon catalogue")
    }

    /// Inserts `profiles` only when both catalogue tables are empty.
    /// Returns the number of rows written.
    pub async fn seed_beacon_profiles(&self, profiles: Vec<BeaconProfile>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row(
                "SELECT (SELECT COUNT(*) FROM beacons) + (SELECT COUNT(*) FROM wifi_access_points)",
                [],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Ok(0);
            }

            for profile in &profiles {
                let sql = match profile.kind {
                    SignalKind::Ble => {
                        "INSERT INTO beacons (service_uuid, rssi, room_id) VALUES (?1, ?2, ?3)"
                    }
                    SignalKind::Wifi => {
                        "INSERT INTO wifi_access_points (bssid, rssi, room_id) VALUES (?1, ?2, ?3)"
                    }
                };
                tx.execute(
                    sql,
                    params![profile.identifier, profile.rssi_threshold, profile.room_id],
                )?;
            }
            tx.commit()?;
            Ok(profiles.len())
        })
        .await
        .context("failed to seed beacon catalogue")
    }

    /// Adds the room if it is unknown. An existing row keeps its name, so a
    /// rename made in the database survives restarts.
    pub async fn ensure_room(&self, room_id: i64, room_name: &str) -> Result<Room> {
        let room_name = room_name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO rooms (room_id, room_name) VALUES (?1, ?2)
                 ON CONFLICT (room_id) DO NOTHING",
                params![room_id, room_name],
            )?;
            Ok(conn.query_row(
                "SELECT room_id, room_name FROM rooms WHERE room_id = ?1",
                params![room_id],
                |row| {
                    Ok(Room {
                        room_id: row.get(0)?,
                        room_name: row.get(1)?,
                    })
                },
            )?)
        })
        .await
    }

    /// Gives every room referenced by a beacon or access point a `rooms` row
    /// (named `Room <id>`) so its occupants are listed. Returns how many
    /// rows were added.
    pub async fn register_catalogue_rooms(&self) -> Result<usize> {
        self.execute(|conn| {
            Ok(conn.execute(
                "INSERT INTO rooms (room_id, room_name)
                 SELECT room_id, 'Room ' || room_id FROM (
                     SELECT room_id FROM beacons
                     UNION
                     SELECT room_id FROM wifi_access_points
                 ) WHERE true
                 ON CONFLICT (room_id) DO NOTHING",
                [],
            )?)
        })
        .await
        .context("failed to register catalogue rooms")
    }

    /// Maps an authenticated username to its internal user id.
    pub async fn find_user_id(&self, username: &str) -> Result<Option<i64>> {
        let username = username.to_string();
        self.execute(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM users WHERE user_id = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    pub async fn ensure_user(&self, username: &str) -> Result<i64> {
        let username = username.trim().to_string();
        if username.is_empty() {
            bail!("username must not be empty");
        }
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id) VALUES (?1) ON CONFLICT (user_id) DO NOTHING",
                params![username],
            )?;
            Ok(conn.query_row(
                "SELECT id FROM users WHERE user_id = ?1",
                params![username],
                |row| row.get(0),
            )?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::connection::test_support::temp_database;
    use crate::db::models::BeaconProfile;
    use crate::models::SignalKind;

    fn profile(kind: SignalKind, identifier: &str, threshold: i32, room_id: i64) -> BeaconProfile {
        BeaconProfile {
            kind,
            identifier: identifier.to_string(),
            rssi_threshold: threshold,
            room_id,
        }
    }

    #[tokio::test]
    async fn seeds_only_an_empty_catalogue() {
        let (_dir, db) = temp_database();
        let seed = vec![
            profile(SignalKind::Wifi, "AA:BB", -75, 6),
            profile(SignalKind::Ble, "UUID-A", -70, 5),
        ];

        assert_eq!(db.seed_beacon_profiles(seed.clone()).await.unwrap(), 2);
        assert_eq!(db.seed_beacon_profiles(seed).await.unwrap(), 0);

        let loaded = db.load_beacon_profiles().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].kind, SignalKind::Ble);
        assert_eq!(loaded[0].rssi_threshold, -70);
        assert_eq!(loaded[1].identifier, "AA:BB");
    }

    #[tokio::test]
    async fn every_catalogue_room_gets_a_row() {
        let (_dir, db) = temp_database();
        db.seed_beacon_profiles(vec![
            profile(SignalKind::Ble, "UUID-A", -70, 5),
            profile(SignalKind::Wifi, "AA:BB", -80, 6),
            profile(SignalKind::Wifi, "CC:DD", -80, 6),
        ])
        .await
        .unwrap();

        assert_eq!(db.ensure_room(5, "Lab").await.unwrap().room_name, "Lab");
        // Names already stored win over later defaults.
        assert_eq!(db.ensure_room(5, "Other").await.unwrap().room_name, "Lab");

        assert_eq!(db.register_catalogue_rooms().await.unwrap(), 1);
        assert_eq!(db.register_catalogue_rooms().await.unwrap(), 0);

        let rooms = db.current_occupants().await.unwrap();
        let names: Vec<_> = rooms
            .iter()
            .map(|room| (room.room_id, room.room_name.as_str()))
            .collect();
        assert_eq!(names, vec![(5, "Lab"), (6, "Room 6")]);
    }

    #[tokio::test]
    async fn users_are_created_once() {
        let (_dir, db) = temp_database();
        let first = db.ensure_user("alice").await.unwrap();
        assert_eq!(db.ensure_user(" alice ").await.unwrap(), first);
        assert_eq!(db.find_user_id("alice").await.unwrap(), Some(first));
        assert_eq!(db.find_user_id("mallory").await.unwrap(), None);
        assert!(db.ensure_user("   ").await.is_err());
    }
}
