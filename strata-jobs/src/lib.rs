//! The two-executor task model used by the strata crates: CPU-heavy and
//! blocking work runs on a worker pool, results come back to the owner over
//! typed completion channels that are drained once per frame on the main
//! thread. Suspension only happens at these channel boundaries; workers never
//! touch shared tree state.

use std::sync::Arc;
use std::thread;

/// A unit of work submitted to a worker executor.
pub type WorkerTask = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run tasks off the main thread. Embedding applications
/// may substitute their own scheduler; [`TaskPool`] is the built-in one.
pub trait TaskProcessor: Send + Sync {
    fn start_task(&self, task: WorkerTask);
}

/// A fixed-size pool of worker threads draining a shared queue.
pub struct TaskPool {
    sender: async_channel::Sender<WorkerTask>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(num_threads: usize) -> Self {
        let (sender, receiver) = async_channel::unbounded::<WorkerTask>();
        let mut workers = Vec::with_capacity(num_threads);
        for index in 0..num_threads.max(1) {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("strata-worker-{index}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv_blocking() {
                        task();
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        Self { sender, workers }
    }

    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        if self.sender.send_blocking(Box::new(task)).is_err() {
            log::error!("task pool queue is closed; dropping task");
        }
    }

    /// Closes the queue and waits for the workers to finish their current
    /// tasks.
    pub fn shutdown(mut self) {
        self.sender.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl TaskProcessor for TaskPool {
    fn start_task(&self, task: WorkerTask) {
        self.spawn(task);
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.sender.close();
    }
}

/// Builds a shared task processor with one worker per available CPU.
pub fn default_task_processor() -> Arc<dyn TaskProcessor> {
    let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    Arc::new(TaskPool::new(threads))
}

/// Sends a completed result from a worker back to the owner.
pub struct CompletionSender<T> {
    sender: async_channel::Sender<T>,
}

// Derived Clone would demand T: Clone; the channel handle clones for any T.
impl<T> Clone for CompletionSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> CompletionSender<T> {
    pub fn send(&self, value: T) {
        if self.sender.send_blocking(value).is_err() {
            log::debug!("completion receiver dropped; discarding result");
        }
    }
}

/// Receives completed results on the main thread. Drained with
/// [`CompletionReceiver::drain`] once per frame.
pub struct CompletionReceiver<T> {
    receiver: async_channel::Receiver<T>,
}

impl<T> CompletionReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(value) = self.receiver.try_recv() {
            out.push(value);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// An unbounded channel pair for delivering worker results to the main
/// thread.
pub fn completion_channel<T>() -> (CompletionSender<T>, CompletionReceiver<T>) {
    let (sender, receiver) = async_channel::unbounded();
    (CompletionSender { sender }, CompletionReceiver { receiver })
}
