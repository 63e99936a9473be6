// SPDX-License-Identifier: GPL-3.0-only

//! Serial execution queue for hardware session work
//!
//! Configuration, start and stop all run on one dedicated thread so they are
//! serialized against each other and never on the caller's render or UI
//! context. `run_sync` blocks the caller until the job finished; `dispatch`
//! returns immediately.

use crate::errors::{SessionError, SessionResult};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct SessionQueue {
    name: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl SessionQueue {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.to_string();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(queue = %thread_name, "Session queue started");
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!(queue = %thread_name, "Session queue exiting");
            })?;

        Ok(Self {
            name: name.to_string(),
            worker_id: worker.thread().id(),
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Whether the current thread is this queue's worker
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Run `job` on the queue and wait for its result.
    ///
    /// Called from the worker itself the job runs inline, so nested session
    /// work cannot deadlock.
    pub fn run_sync<R, F>(&self, job: F) -> SessionResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel::<R>(1);
        self.dispatch(move || {
            // Receiver only disappears if the caller gave up waiting
            let _ = reply_tx.send(job());
        })?;

        reply_rx.recv().map_err(|_| {
            warn!(queue = %self.name, "Session job dropped without a result");
            SessionError::QueueClosed
        })
    }

    /// Queue `job` without waiting
    pub fn dispatch<F>(&self, job: F) -> SessionResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(SessionError::QueueClosed)?;
        sender
            .send(Box::new(job))
            .map_err(|_| SessionError::QueueClosed)
    }
}

impl Drop for SessionQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining jobs and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if self.is_current() {
                return;
            }
            if worker.join().is_err() {
                warn!(queue = %self.name, "Session queue worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for SessionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionQueue").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_run_sync_returns_value_from_worker() {
        let queue = SessionQueue::new("test-queue").unwrap();
        let name = queue
            .run_sync(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-queue"));
    }

    #[test]
    fn test_jobs_run_in_order() {
        let queue = SessionQueue::new("test-order").unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            queue.dispatch(move || log.lock().unwrap().push(i)).unwrap();
        }
        queue.run_sync(|| ()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_drains_pending_jobs() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let queue = SessionQueue::new("test-drain").unwrap();
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                queue
                    .dispatch(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
