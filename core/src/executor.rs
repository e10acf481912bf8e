// Async work executor
//
// One cooperative loop on a dedicated worker thread. All services run their
// async work here; blocking plugin calls hop to the blocking pool via
// `blocking`, which is the only place suspension implies parallelism.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::Sender;
use tokio::runtime;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::{EngramError, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Handle to a scheduled task. Errors are logged inside the task, so a
/// dropped handle never swallows a failure silently.
pub struct TaskHandle<T>(tokio::task::JoinHandle<Result<T>>);

impl<T> TaskHandle<T> {
    pub async fn join(self) -> Result<T> {
        self.0
            .await
            .map_err(|err| EngramError::Backend(format!("task did not complete: {err}")))?
    }

    pub fn abort(&self) {
        self.0.abort();
    }
}

/// Results of a gather, keyed by the name each task was submitted under.
/// Tasks submitted under the same name accumulate in submission order.
pub struct GatherResults<T> {
    results: HashMap<String, Vec<Result<T>>>,
}

impl<T> GatherResults<T> {
    pub fn take(&mut self, name: &str) -> Vec<Result<T>> {
        self.results.remove(name).unwrap_or_default()
    }

    pub fn take_one(&mut self, name: &str) -> Result<T> {
        self.take(name)
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                Err(EngramError::Invariant(format!(
                    "no gathered task named '{name}'"
                )))
            })
    }
}

/// Single-threaded cooperative executor.
pub struct Executor {
    handle: runtime::Handle,
    shutdown: Arc<Notify>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    errors: Sender<EngramError>,
}

impl Executor {
    /// Spawn the worker thread and its current-thread runtime. Background
    /// task failures are reported through `errors` and surfaced by the host
    /// at shutdown.
    pub fn new(errors: Sender<EngramError>) -> Result<Self> {
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();

        let thread = thread::Builder::new()
            .name("engramic-executor".to_string())
            .spawn(move || {
                let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = handle_tx.send(Err(err));
                        return;
                    }
                };
                if handle_tx.send(Ok(rt.handle().clone())).is_err() {
                    return;
                }
                rt.block_on(async move {
                    stop.notified().await;
                });
                // Dropping the runtime cancels whatever is still in flight.
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| {
                EngramError::Backend("executor thread exited before handing over its runtime".to_string())
            })?
            .map_err(EngramError::Io)?;

        info!("executor started");
        Ok(Self {
            handle,
            shutdown,
            thread: Mutex::new(Some(thread)),
            errors,
        })
    }

    /// Schedule one task. The returned handle can be joined for the result;
    /// failures are logged either way.
    pub fn run_task<T, F>(&self, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle.spawn(async move {
            let result = fut.await;
            if let Err(err) = &result {
                error!("task failed: {err}");
            }
            result
        });
        TaskHandle(handle)
    }

    /// Gather a set of named tasks. Per-task failures are captured in the
    /// results, not fatal to siblings.
    pub fn run_tasks<T>(&self, tasks: Vec<(String, BoxFuture<T>)>) -> TaskHandle<GatherResults<T>>
    where
        T: Send + 'static,
    {
        let spawner = self.handle.clone();
        let gathered = self.handle.spawn(async move {
            let mut spawned = Vec::with_capacity(tasks.len());
            for (name, fut) in tasks {
                spawned.push((name, spawner.spawn(fut)));
            }

            let mut results: HashMap<String, Vec<Result<T>>> = HashMap::new();
            for (name, join) in spawned {
                let result = match join.await {
                    Ok(inner) => inner,
                    Err(err) => Err(EngramError::Backend(format!(
                        "gathered task '{name}' did not complete: {err}"
                    ))),
                };
                if let Err(err) = &result {
                    error!("gathered task '{name}' failed: {err}");
                }
                results.entry(name).or_default().push(result);
            }
            Ok(GatherResults { results })
        });
        TaskHandle(gathered)
    }

    /// Fire-and-forget. An error lands on the host's exception queue and is
    /// raised as a terminal error at shutdown.
    pub fn run_background<F>(&self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let errors = self.errors.clone();
        self.handle.spawn(async move {
            if let Err(err) = fut.await {
                error!("background task failed: {err}");
                let _ = errors.send(err);
            }
        });
    }

    /// Run a blocking closure off the cooperative loop.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle
            .spawn_blocking(f)
            .await
            .map_err(|err| EngramError::Backend(format!("blocking task did not complete: {err}")))?
    }

    /// Stop the loop and join the worker thread. Outstanding tasks are
    /// cancelled; producers only ever see a logged warning.
    pub fn stop(&self) {
        self.shutdown.notify_one();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("executor thread panicked during shutdown");
            }
        }
        info!("executor stopped");
    }
}
