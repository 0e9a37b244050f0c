use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        if self.jobs.send(Message::Stop).is_err() {
            warn!("database worker already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("database worker panicked");
        }
    }
}

/// Handle to the SQLite worker thread. Every statement runs on that one
/// connection; cross-process safety comes from SQLite's own locking.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    run_migrations(&mut conn).context("failed to migrate database")?;
    Ok(conn)
}

fn serve_jobs(mut conn: Connection, inbox: mpsc::Receiver<Message>) {
    for message in inbox {
        match message {
            Message::Run(job) => job(&mut conn),
            Message::Stop => break,
        }
    }
    info!("database worker stopped");
}

impl Database {
    /// Opens (creating if needed) and migrates the database, then parks the
    /// connection on a dedicated thread. Fails if the file cannot be opened
    /// or the schema cannot be brought up to date.
    pub fn new(path: PathBuf, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs, inbox) = mpsc::channel::<Message>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("roomsense-db".into())
            .spawn(move || match open_connection(&thread_path, busy_timeout) {
                Ok(conn) => {
                    if opened_tx.send(Ok(())).is_ok() {
                        serve_jobs(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(err));
                }
            })
            .context("failed to spawn database worker")?;

        opened_rx
            .recv()
            .context("database worker exited during startup")??;
        info!("database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the worker's connection and hands back its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; nothing to do then.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("database worker is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }

    /// Cheap round trip used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        self.execute(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::Database;

    /// Opens a migrated database inside a fresh temp directory. Keep the
    /// returned `TempDir` alive for as long as the database is used.
    pub fn temp_database() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("roomsense.sqlite3"), Duration::from_secs(5))
            .expect("open database");
        (dir, db)
    }
}
