use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{info, warn};
use parking_lot::RwLock;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::thread::error::WorkerError;
use crate::thread::worker::{WaitGraph, Worker};

/// Named set of workers sharing one wait graph.
pub struct WorkerPool {
    name: &'static str,
    default_name: String,
    workers: RwLock<BTreeMap<String, Worker>>,
    waits: Arc<WaitGraph>,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Create the pool and spawn its default worker.
    pub fn new(default_name: impl Into<String>) -> std::result::Result<Self, WorkerError> {
        let default_name = default_name.into();
        let waits = WaitGraph::new();
        let default = Worker::spawn_in(default_name.clone(), Arc::clone(&waits))?;
        let mut workers = BTreeMap::new();
        workers.insert(default_name.clone(), default);
        Ok(Self {
            name: "WorkerPool",
            default_name,
            workers: RwLock::new(workers),
            waits,
            closed: AtomicBool::new(false),
        })
    }

    pub fn default_worker(&self) -> std::result::Result<Worker, WorkerError> {
        self.get_or_spawn(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn get(&self, name: &str) -> Option<Worker> {
        self.workers.read().get(name).cloned()
    }

    /// Return the worker called `name`, spawning it on first use.
    ///
    /// A worker stopped on its own is replaced; components still holding the
    /// old one keep failing with [`WorkerError::WorkerStopped`]. Nothing is
    /// spawned once the pool has been stopped.
    pub fn get_or_spawn(&self, name: &str) -> std::result::Result<Worker, WorkerError> {
        if let Some(worker) = self.workers.read().get(name) {
            if worker.is_running() {
                return Ok(worker.clone());
            }
        }
        let mut workers = self.workers.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkerError::WorkerStopped {
                worker: name.to_string(),
            });
        }
        if let Some(worker) = workers.get(name) {
            if worker.is_running() {
                return Ok(worker.clone());
            }
            warn!("Worker '{}' ({}) was stopped; spawning a replacement", name, worker.id());
        }
        let worker = Worker::spawn_in(name, Arc::clone(&self.waits))?;
        workers.insert(name.to_string(), worker.clone());
        Ok(worker)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.read().keys().cloned().collect()
    }

    pub fn wait_graph(&self) -> &Arc<WaitGraph> {
        &self.waits
    }

    /// Stop every worker, the default one last. The pool spawns nothing
    /// afterwards.
    pub async fn stop_all(&self) {
        let workers: Vec<(String, Worker)> = {
            let mut map = self.workers.write();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *map).into_iter().collect()
        };
        let (default, others): (Vec<_>, Vec<_>) = workers
            .into_iter()
            .partition(|(name, _)| *name == self.default_name);
        for (_, worker) in others.into_iter().chain(default) {
            worker.stop().await;
        }
        info!("All workers stopped");
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("default", &self.default_name)
            .field("workers", &self.names())
            .finish()
    }
}

#[async_trait]
impl KernelComponent for WorkerPool {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.default_worker()?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_all().await;
        Ok(())
    }
}
