use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, to_db_time},
    models::{
        AllUsersPresenceDay, CurrentOccupant, PresenceSession, RoomOccupants, SessionChange,
        UserPresenceDay, UserPresenceDetail,
    },
};

const SESSION_COLUMNS: &str = "session_id, user_id, room_id, start_time, end_time, last_seen";

fn row_to_session(row: &Row) -> Result<PresenceSession> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let last_seen: String = row.get("last_seen")?;

    Ok(PresenceSession {
        session_id: row.get("session_id")?,
        user_id: row.get("user_id")?,
        room_id: row.get("room_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        last_seen: parse_datetime(&last_seen, "last_seen")?,
    })
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn group_by_day(sessions: Vec<PresenceSession>) -> Vec<UserPresenceDay> {
    let mut days: BTreeMap<String, Vec<PresenceSession>> = BTreeMap::new();
    for session in sessions {
        days.entry(day_key(session.start_time))
            .or_default()
            .push(session);
    }
    days.into_iter()
        .map(|(date, sessions)| UserPresenceDay { date, sessions })
        .collect()
}

fn group_by_day_and_user(sessions: Vec<PresenceSession>) -> Vec<AllUsersPresenceDay> {
    let mut days: BTreeMap<String, BTreeMap<i64, Vec<PresenceSession>>> = BTreeMap::new();
    for session in sessions {
        days.entry(day_key(session.start_time))
            .or_default()
            .entry(session.user_id)
            .or_default()
            .push(session);
    }
    days.into_iter()
        .map(|(date, users)| AllUsersPresenceDay {
            date,
            users: users
                .into_iter()
                .map(|(user_id, sessions)| UserPresenceDetail { user_id, sessions })
                .collect(),
        })
        .collect()
}

impl Database {
    /// Records that `user_id` was seen in `room_id` at `at`.
    ///
    /// Runs under `BEGIN IMMEDIATE`, so the write lock is held before the
    /// open session is read and two writers for the same user cannot both
    /// observe "no open session". The partial unique index on open sessions
    /// rejects anything that slips past.
    pub async fn upsert_presence(
        &self,
        user_id: i64,
        room_id: i64,
        at: DateTime<Utc>,
    ) -> Result<SessionChange> {
        self.execute(move |conn| {
            let at = to_db_time(at);
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to begin presence transaction")?;

            let open: Option<(i64, i64, String)> = tx
                .query_row(
                    "SELECT session_id, room_id, last_seen
                     FROM user_presence_sessions
                     WHERE user_id = ?1 AND end_time IS NULL",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let change = match open {
                Some((session_id, open_room, _)) if open_room == room_id => {
                    // Out-of-order submissions never move last_seen backwards.
                    tx.execute(
                        "UPDATE user_presence_sessions
                         SET last_seen = CASE WHEN last_seen < ?1 THEN ?1 ELSE last_seen END
                         WHERE session_id = ?2",
                        params![at, session_id],
                    )?;
                    SessionChange::Refreshed { session_id }
                }
                // A move reported before the last confirmation in the current
                // room is out of date; the open session stands.
                Some((session_id, _, last_seen)) if at < last_seen => {
                    SessionChange::Superseded { session_id }
                }
                Some((closed_session_id, _, _)) => {
                    tx.execute(
                        "UPDATE user_presence_sessions
                         SET end_time = CASE WHEN start_time > ?1 THEN start_time ELSE ?1 END
                         WHERE session_id = ?2",
                        params![at, closed_session_id],
                    )?;
                    let session_id = insert_open_session(&tx, user_id, room_id, &at)?;
                    SessionChange::Moved {
                        closed_session_id,
                        session_id,
                    }
                }
                None => SessionChange::Opened {
                    session_id: insert_open_session(&tx, user_id, room_id, &at)?,
                },
            };

            tx.commit().context("failed to commit presence transaction")?;
            Ok(change)
        })
        .await
        .with_context(|| format!("presence upsert failed for user {user_id}"))
    }

    /// Closes the user's open session, if any. Returns the closed session id.
    pub async fn close_presence(&self, user_id: i64, at: DateTime<Utc>) -> Result<Option<i64>> {
        self.execute(move |conn| {
            let closed = conn
                .query_row(
                    "UPDATE user_presence_sessions
                     SET end_time = CASE WHEN start_time > ?1 THEN start_time ELSE ?1 END
                     WHERE user_id = ?2 AND end_time IS NULL
                     RETURNING session_id",
                    params![to_db_time(at), user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(closed)
        })
        .await
        .with_context(|| format!("presence close failed for user {user_id}"))
    }

    pub async fn open_session(&self, user_id: i64) -> Result<Option<PresenceSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM user_presence_sessions
                 WHERE user_id = ?1 AND end_time IS NULL"
            ))?;
            let mut rows = stmt.query(params![user_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    /// Open sessions whose `last_seen` is strictly before `cutoff`.
    pub async fn stale_open_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<PresenceSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM user_presence_sessions
                 WHERE end_time IS NULL AND last_seen < ?1
                 ORDER BY last_seen ASC"
            ))?;
            let mut rows = stmt.query(params![to_db_time(cutoff)])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Closes one reaped session at `end_time`, unless it was refreshed
    /// after `cutoff` in the meantime. Returns whether a row was closed.
    pub async fn close_stale_session(
        &self,
        session_id: i64,
        end_time: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE user_presence_sessions
                 SET end_time = ?1
                 WHERE session_id = ?2 AND end_time IS NULL AND last_seen < ?3",
                params![to_db_time(end_time), session_id, to_db_time(cutoff)],
            )?;
            Ok(changed == 1)
        })
        .await
        .with_context(|| format!("failed to reap session {session_id}"))
    }

    pub async fn presence_history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AllUsersPresenceDay>> {
        let sessions = self.sessions_since(None, since).await?;
        Ok(group_by_day_and_user(sessions))
    }

    pub async fn user_presence_history_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<UserPresenceDay>> {
        let sessions = self.sessions_since(Some(user_id), since).await?;
        Ok(group_by_day(sessions))
    }

    async fn sessions_since(
        &self,
        user_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<Vec<PresenceSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM user_presence_sessions
                 WHERE start_time >= ?1 AND (?2 IS NULL OR user_id = ?2)
                 ORDER BY start_time ASC, session_id ASC"
            ))?;
            let mut rows = stmt.query(params![to_db_time(since), user_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Every room, with the users whose open session is in it.
    pub async fn current_occupants(&self) -> Result<Vec<RoomOccupants>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.room_id, r.room_name, u.user_id AS username, s.last_seen
                 FROM rooms r
                 LEFT JOIN user_presence_sessions s
                        ON s.room_id = r.room_id AND s.end_time IS NULL
                 LEFT JOIN users u ON u.id = s.user_id
                 ORDER BY r.room_id ASC, s.last_seen DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut rooms: Vec<RoomOccupants> = Vec::new();
            while let Some(row) = rows.next()? {
                let room_id: i64 = row.get("room_id")?;
                let username: Option<String> = row.get("username")?;
                let last_seen: Option<String> = row.get("last_seen")?;

                if rooms.last().map(|room| room.room_id) != Some(room_id) {
                    rooms.push(RoomOccupants {
                        room_id,
                        room_name: row.get("room_name")?,
                        occupants: Vec::new(),
                    });
                }
                let Some(room) = rooms.last_mut() else {
                    bail!("room {room_id} vanished while grouping occupants");
                };
                if let (Some(user_id), Some(last_seen)) = (username, last_seen) {
                    room.occupants.push(CurrentOccupant {
                        user_id,
                        last_seen: parse_datetime(&last_seen, "last_seen")?,
                    });
                }
            }
            Ok(rooms)
        })
        .await
    }
}

fn insert_open_session(
    tx: &rusqlite::Transaction<'_>,
    user_id: i64,
    room_id: i64,
    at: &str,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO user_presence_sessions (user_id, room_id, start_time, end_time, last_seen)
         VALUES (?1, ?2, ?3, NULL, ?3)",
        params![user_id, room_id, at],
    )
    .with_context(|| format!("failed to open session for user {user_id} in room {room_id}"))?;
    Ok(tx.last_insert_rowid())
}
