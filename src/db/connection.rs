use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "billsync-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMsg {
    Run(Job),
    Stop,
}

/// Owns the worker thread; stopping and joining happens when the last
/// `Database` clone goes away.
struct Worker {
    jobs: mpsc::Sender<WorkerMsg>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let Some(thread) = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        if self.jobs.send(WorkerMsg::Stop).is_err() {
            warn!("entry database worker already gone at shutdown");
        }
        if let Err(panic) = thread.join() {
            error!("entry database worker panicked: {panic:?}");
        }
    }
}

/// Handle to the entry database. All statements run on one dedicated
/// thread that owns the connection; callers await the result.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Opens (or creates) the database at `path` and brings the schema up
    /// to date before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<WorkerMsg>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for msg in jobs_rx {
                    match msg {
                        WorkerMsg::Run(job) => job(&mut conn),
                        WorkerMsg::Stop => break,
                    }
                }
                info!("entry database worker stopped");
            })
            .context("failed to spawn entry database worker")?;

        ready_rx
            .recv()
            .context("entry database worker exited during startup")??;
        info!("entry database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: jobs_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` on the worker thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have given up waiting; the statement still ran.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(WorkerMsg::Run(job))
            .map_err(|_| anyhow!("entry database worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("entry database worker dropped the request"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("could not switch entry database to WAL: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}
