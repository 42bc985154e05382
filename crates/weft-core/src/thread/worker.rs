use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error, trace};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::thread::error::WorkerError;
use crate::utils::panic_message;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_WORKER: WorkerId;
}

type Task = BoxFuture<'static, ()>;

/// Process-unique identity of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// Records which worker is blocked waiting on which, so that a blocking
/// call closing a cycle is refused instead of hanging.
#[derive(Default)]
pub struct WaitGraph {
    state: Mutex<WaitState>,
}

#[derive(Default)]
struct WaitState {
    edges: HashMap<WorkerId, Vec<WorkerId>>,
    names: HashMap<WorkerId, String>,
}

impl WaitState {
    fn name(&self, id: WorkerId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Path of waits leading from `start` to `target`, both included.
    fn path(&self, start: WorkerId, target: WorkerId) -> Option<Vec<WorkerId>> {
        let mut stack = vec![(start, vec![start])];
        let mut visited = HashSet::new();
        while let Some((node, path)) = stack.pop() {
            if node == target {
                return Some(path);
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.edges.get(&node) {
                for &n in next {
                    let mut extended = path.clone();
                    extended.push(n);
                    stack.push((n, extended));
                }
            }
        }
        None
    }
}

impl WaitGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, id: WorkerId, name: &str) {
        self.state.lock().names.insert(id, name.to_string());
    }

    /// Number of blocking waits currently in flight.
    pub fn pending_waits(&self) -> usize {
        self.state.lock().edges.values().map(Vec::len).sum()
    }

    fn enter(self: &Arc<Self>, from: WorkerId, to: WorkerId) -> Result<WaitGuard, WorkerError> {
        let mut state = self.state.lock();
        if let Some(path) = state.path(to, from) {
            let chain: Vec<String> = path.iter().map(|id| state.name(*id)).collect();
            return Err(WorkerError::DeadlockDetected {
                from: state.name(from),
                to: state.name(to),
                cycle: format!("{} -> {}", state.name(from), chain.join(" -> ")),
            });
        }
        state.edges.entry(from).or_default().push(to);
        Ok(WaitGuard {
            graph: Arc::clone(self),
            from,
            to,
        })
    }
}

impl fmt::Debug for WaitGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitGraph")
            .field("pending_waits", &self.pending_waits())
            .finish()
    }
}

struct WaitGuard {
    graph: Arc<WaitGraph>,
    from: WorkerId,
    to: WorkerId,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut state = self.graph.state.lock();
        if let Some(targets) = state.edges.get_mut(&self.from) {
            if let Some(pos) = targets.iter().position(|t| *t == self.to) {
                targets.remove(pos);
            }
            if targets.is_empty() {
                state.edges.remove(&self.from);
            }
        }
    }
}

/// A serial execution context: a FIFO queue of tasks drained one at a time
/// by a single tokio task.
///
/// Tasks posted to the same worker run in submission order and never
/// interleave, even across `.await` points inside a task. A blocking
/// [`run`](Worker::run) issued from the worker's own task executes inline.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    id: WorkerId,
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    waits: Arc<WaitGraph>,
}

impl Worker {
    /// Spawn a standalone worker on the current tokio runtime.
    pub fn spawn(name: impl Into<String>) -> Result<Self, WorkerError> {
        Self::spawn_in(name, WaitGraph::new())
    }

    /// Spawn a worker sharing `waits` with its siblings so cross-worker
    /// cycles can be detected.
    pub fn spawn_in(name: impl Into<String>, waits: Arc<WaitGraph>) -> Result<Self, WorkerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let name = name.into();
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        waits.register(id, &name);
        let join = runtime.spawn(drain(id, name.clone(), receiver));
        debug!("Spawned worker '{}' ({})", name, id);
        Ok(Self {
            inner: Arc::new(WorkerInner {
                id,
                name,
                sender: Mutex::new(Some(sender)),
                join: Mutex::new(Some(join)),
                waits,
            }),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity of the worker executing the calling task, if any.
    pub fn current_id() -> Option<WorkerId> {
        CURRENT_WORKER.try_with(|id| *id).ok()
    }

    pub fn is_current(&self) -> bool {
        Self::current_id() == Some(self.inner.id)
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .sender
            .lock()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Enqueue a task and return immediately.
    pub fn post<F>(&self, task: F) -> Result<(), WorkerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.inner.sender.lock();
        let sender = guard.as_ref().ok_or_else(|| self.stopped())?;
        sender.send(Box::pin(task)).map_err(|_| self.stopped())
    }

    /// Execute `task` on this worker and wait for its output.
    ///
    /// Runs inline when called from this worker. Fails with
    /// [`WorkerError::DeadlockDetected`] when the calling worker is itself
    /// (transitively) awaited by this one.
    pub async fn run<F, T>(&self, task: F) -> Result<T, WorkerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            trace!("Running task inline on worker '{}'", self.inner.name);
            return Ok(task.await);
        }
        let _wait = match Self::current_id() {
            Some(from) => Some(self.inner.waits.enter(from, self.inner.id)?),
            None => None,
        };
        let (tx, rx) = oneshot::channel();
        self.post(async move {
            let _ = tx.send(task.await);
        })?;
        rx.await.map_err(|_| WorkerError::TaskDropped {
            worker: self.inner.name.clone(),
        })
    }

    /// Close the queue. Tasks already accepted still run; new ones are
    /// refused with [`WorkerError::WorkerStopped`].
    pub async fn stop(&self) {
        let sender = self.inner.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        let join = self.inner.join.lock().take();
        if self.is_current() {
            debug!("Worker '{}' stopped from its own task; queue closes after it returns", self.inner.name);
            return;
        }
        if let Some(join) = join {
            if let Err(e) = join.await {
                error!("Worker '{}' terminated abnormally: {}", self.inner.name, e);
            }
        }
        debug!("Worker '{}' stopped", self.inner.name);
    }

    fn stopped(&self) -> WorkerError {
        WorkerError::WorkerStopped {
            worker: self.inner.name.clone(),
        }
    }
}

impl PartialEq for Worker {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Worker {}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn drain(id: WorkerId, name: String, mut receiver: mpsc::UnboundedReceiver<Task>) {
    while let Some(task) = receiver.recv().await {
        let outcome = CURRENT_WORKER
            .scope(id, AssertUnwindSafe(task).catch_unwind())
            .await;
        if let Err(panic) = outcome {
            error!("Task on worker '{}' panicked: {}", name, panic_message(panic.as_ref()));
        }
    }
    debug!("Worker '{}' drained its queue", name);
}
