use std::{
    io,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Result;
use log::{info, warn};
use rusqlite::{Connection, Transaction};
use thiserror::Error;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to create roster directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open roster database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("failed to prepare roster database: {0}")]
    Migrate(String),

    #[error("failed to start roster database thread: {0}")]
    Spawn(io::Error),

    #[error("roster database worker is not running")]
    Unavailable,
}

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the worker thread. Closing the job channel ends the thread's loop.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Roster database thread panicked");
            }
        }
    }
}

/// Local roster store. One thread owns the SQLite connection; callers send
/// it closures and await the reply.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

/// Opens the file, enforces foreign keys (group/student cascades rely on
/// them) and brings the schema up to date.
fn open_roster(path: &Path) -> Result<Connection, DbError> {
    let mut conn = Connection::open(path).map_err(|source| DbError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let pragmas = conn
        .pragma_update(None, "foreign_keys", "ON")
        .and_then(|_| conn.busy_timeout(BUSY_TIMEOUT));
    if let Err(source) = pragmas {
        return Err(DbError::Open {
            path: path.to_path_buf(),
            source,
        });
    }

    match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    }) {
        Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
        Ok(mode) => warn!("Roster database stays in {mode} journal mode"),
        Err(err) => warn!("Could not switch roster database to WAL: {err}"),
    }

    run_migrations(&mut conn).map_err(|err| DbError::Migrate(format!("{err:#}")))?;
    Ok(conn)
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DbError>>(1);
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("rollcall-db".into())
            .spawn(move || {
                let mut conn = match open_roster(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for job in jobs_rx {
                    job(&mut conn);
                }
                info!("Roster database closed");
            })
            .map_err(DbError::Spawn)?;

        ready_rx.recv().map_err(|_| DbError::Unavailable)??;
        info!("Roster database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs_tx),
                thread: Some(thread),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.worker.jobs.as_ref().ok_or(DbError::Unavailable)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });
        jobs.send(job).map_err(|_| DbError::Unavailable)?;

        reply_rx.await.map_err(|_| DbError::Unavailable)?
    }

    /// Runs `task` inside a transaction; any error rolls everything back.
    pub async fn transaction<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let value = task(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn failed_transaction_leaves_no_rows() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("roster.sqlite3")).unwrap();

        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute("INSERT INTO classes (name, created_at) VALUES ('1-A', 'now')", [])?;
                anyhow::bail!("abort import")
            })
            .await;
        assert!(result.is_err());

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM classes", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("roster.sqlite3")).unwrap();

        let orphan = db
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO groups (name, class_id, created_at) VALUES ('G1', 999, 'now')",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(orphan.is_err());
    }

    #[test]
    fn directory_path_is_rejected() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a database file.
        assert!(Database::open(dir.path().to_path_buf()).is_err());
    }
}
