//! Task executors.
//!
//! The domain runs work on three independent executors: a single-worker
//! committer that persists chunks in acceptance order, a sync executor for
//! background fsyncs, and a session executor for replay. Keeping them apart
//! means a slow reader never blocks a writer and a pending fsync never
//! blocks new commits.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on worker threads.
pub trait Executor: Send + Sync {
    /// Submits a task.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExecutorShutdown`] if the executor no longer
    /// accepts tasks. The task is dropped without running.
    fn execute(&self, task: Task) -> CoreResult<()>;

    /// Blocks until every task submitted before this call has completed.
    ///
    /// Must not be called from one of the executor's own workers.
    fn sync(&self);
}

/// Number of submitted tasks that have not completed yet.
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }
}

/// Marks a task done even if it panics.
struct PendingGuard<'a>(&'a Pending);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// A fixed pool of named worker threads fed by a channel.
///
/// With a single worker, tasks run strictly one at a time in submission
/// order.
pub struct ThreadExecutor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl ThreadExecutor {
    /// Starts an executor with `threads` workers named `<name>-<n>`.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> CoreResult<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let executor = Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(threads)),
            pending: Arc::clone(&pending),
        };

        for index in 0..threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&receiver, &pending))?;
            executor.workers.lock().push(handle);
        }

        Ok(executor)
    }

    /// Name of the executor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting tasks, runs everything already queued and joins
    /// the workers. Calling it again is a no-op.
    ///
    /// When called from one of its own workers (the last owner dropped
    /// inside a task), that worker is detached instead of joined.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!(executor = %self.name, "worker thread panicked");
            }
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Task>>, pending: &Pending) {
    loop {
        let next = receiver.lock().recv();
        match next {
            Ok(task) => {
                let _guard = PendingGuard(pending);
                task();
            }
            Err(_) => break,
        }
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> CoreResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(CoreError::executor_shutdown(&self.name));
        };
        self.pending.add();
        if sender.send(task).is_err() {
            self.pending.done();
            return Err(CoreError::executor_shutdown(&self.name));
        }
        Ok(())
    }

    fn sync(&self) {
        self.pending.wait_drained();
    }
}

impl Drop for ThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field("name", &self.name)
            .field("workers", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}
