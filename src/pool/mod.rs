//! A fixed-size pool of isolated worker processes.
//!
//! Workers are separate OS processes executing one pure function over
//! serialisable inputs; the parent stays single-threaded and blocks only on
//! the worker channels. Jobs are dispatched round-robin; each worker's
//! replies come back in submission order, so callbacks are held in a
//! per-worker FIFO. Ordering across workers is unspecified and nothing in
//! the crate relies on it.
//!
//! Backpressure: each worker has a bounded in-flight window. Submitting to
//! a saturated worker first services that worker's completed replies, which
//! bounds queued memory during discovery of very large collections.
//!
//! Failure: a worker's `Error` frame, or its EOF without one, latches the
//! pool as failed; the error surfaces on the current and every later
//! `submit`/`drain`.

pub mod protocol;
pub mod worker;

use std::collections::VecDeque;
use std::io::BufReader;
use std::marker::PhantomData;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::pool::protocol::{read_frame, write_frame, Reply};
use crate::util::warn;

const MAX_INFLIGHT_PER_WORKER: usize = 32;

type Callback<R> = Box<dyn FnOnce(R)>;

pub struct WorkerPool<A, R> {
    workers: Vec<WorkerHandle<R>>,
    next: usize,
    failed: Option<String>,
    _args: PhantomData<fn(A)>,
}

struct WorkerHandle<R> {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    queue: VecDeque<Callback<R>>,
}

impl<A: Serialize, R: DeserializeOwned> WorkerPool<A, R> {
    /// Spawn `count` workers from the command `make` builds. Stdin/stdout
    /// carry the frame protocol; stderr is inherited.
    pub fn spawn(count: usize, make: impl Fn() -> Command) -> Result<Self> {
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);
        for _ in 0..count {
            let mut child = make()
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()?;
            let stdin = child.stdin.take().expect("piped stdin");
            let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
            workers.push(WorkerHandle {
                child,
                stdin: Some(stdin),
                stdout,
                queue: VecDeque::new(),
            });
        }
        Ok(Self {
            workers,
            next: 0,
            failed: None,
            _args: PhantomData,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Dispatch a job to the next worker round-robin. The callback fires
    /// from a later `submit` or `drain` on this pool, in submission order
    /// relative to other jobs on the same worker.
    pub fn submit(&mut self, args: &A, callback: impl FnOnce(R) + 'static) -> Result<()> {
        self.check_failed()?;
        let idx = self.next;
        self.next = (self.next + 1) % self.workers.len();

        while self.workers[idx].queue.len() >= MAX_INFLIGHT_PER_WORKER {
            self.service_one(idx)?;
        }

        let stdin = self.workers[idx]
            .stdin
            .as_mut()
            .expect("stdin open while pool alive");
        if write_frame(stdin, args).is_err() {
            // The worker is gone; pick up its parting error frame if any.
            return Err(self.mark_dead(idx));
        }
        self.workers[idx].queue.push_back(Box::new(callback));
        Ok(())
    }

    /// Block until every outstanding callback has been invoked.
    pub fn drain(&mut self) -> Result<()> {
        self.check_failed()?;
        for idx in 0..self.workers.len() {
            while !self.workers[idx].queue.is_empty() {
                self.service_one(idx)?;
            }
        }
        Ok(())
    }

    /// Close the job channels and reap the workers.
    pub fn shutdown(mut self) -> Result<()> {
        self.drain()?;
        for worker in &mut self.workers {
            worker.stdin.take();
        }
        for worker in &mut self.workers {
            worker.child.wait()?;
        }
        self.workers.clear();
        Ok(())
    }

    fn check_failed(&self) -> Result<()> {
        match &self.failed {
            Some(msg) => Err(Error::Worker(msg.clone())),
            None => Ok(()),
        }
    }

    /// Read frames from one worker until a result fires its callback.
    fn service_one(&mut self, idx: usize) -> Result<()> {
        loop {
            let frame = match read_frame::<_, Reply<R>>(&mut self.workers[idx].stdout) {
                Ok(frame) => frame,
                Err(err) => {
                    self.failed = Some(err.to_string());
                    return Err(Error::Worker(err.to_string()));
                }
            };
            match frame {
                Some(Reply::Warning(msg)) => warn(&msg),
                Some(Reply::Error(msg)) => {
                    self.failed = Some(msg.clone());
                    return Err(Error::Worker(msg));
                }
                Some(Reply::Result(result)) => {
                    let callback = self.workers[idx]
                        .queue
                        .pop_front()
                        .expect("result matches an outstanding job");
                    callback(result);
                    return Ok(());
                }
                None => {
                    let msg = "worker exited unexpectedly".to_string();
                    self.failed = Some(msg.clone());
                    return Err(Error::Worker(msg));
                }
            }
        }
    }

    /// Drain a dead worker's final frames to surface its own error message
    /// in preference to a bare broken-pipe report.
    fn mark_dead(&mut self, idx: usize) -> Error {
        loop {
            match read_frame::<_, Reply<R>>(&mut self.workers[idx].stdout) {
                Ok(Some(Reply::Error(msg))) => {
                    self.failed = Some(msg.clone());
                    return Error::Worker(msg);
                }
                Ok(Some(Reply::Warning(msg))) => warn(&msg),
                Ok(Some(Reply::Result(_))) | Ok(None) | Err(_) => {
                    let msg = "worker exited unexpectedly".to_string();
                    self.failed = Some(msg.clone());
                    return Error::Worker(msg);
                }
            }
        }
    }
}

impl<A, R> Drop for WorkerPool<A, R> {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.stdin.take();
            let _ = worker.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// `cat` echoes request frames verbatim, so a request shaped like a
    /// reply envelope comes back as that reply.
    fn echo_pool(count: usize) -> WorkerPool<serde_json::Value, u32> {
        WorkerPool::spawn(count, || Command::new("cat")).unwrap()
    }

    fn result_frame(n: u32) -> serde_json::Value {
        serde_json::json!({ "result": n })
    }

    #[test]
    fn single_worker_replies_in_submission_order() {
        let mut pool = echo_pool(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..20u32 {
            let seen = Rc::clone(&seen);
            pool.submit(&result_frame(n), move |r| seen.borrow_mut().push(r))
                .unwrap();
        }
        pool.drain().unwrap();
        assert_eq!(*seen.borrow(), (0..20).collect::<Vec<_>>());
        pool.shutdown().unwrap();
    }

    #[test]
    fn per_worker_order_holds_across_round_robin() {
        let mut pool = echo_pool(3);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..30u32 {
            let seen = Rc::clone(&seen);
            pool.submit(&result_frame(n), move |r| seen.borrow_mut().push(r))
                .unwrap();
        }
        pool.drain().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 30);
        // Jobs n, n+3, n+6… went to the same worker; their callbacks must
        // appear in that relative order whatever the interleaving.
        for lane in 0..3u32 {
            let lane_order: Vec<_> = seen.iter().copied().filter(|r| r % 3 == lane).collect();
            let mut sorted = lane_order.clone();
            sorted.sort_unstable();
            assert_eq!(lane_order, sorted);
        }
    }

    #[test]
    fn error_frame_latches_the_pool() {
        let mut pool: WorkerPool<serde_json::Value, u32> = echo_pool(1);
        pool.submit(&serde_json::json!({ "error": "boom" }), |_| {})
            .unwrap();
        let err = pool.drain().unwrap_err();
        assert!(matches!(err, Error::Worker(ref m) if m == "boom"));
        // Latched: later operations fail without touching the worker.
        assert!(pool.drain().is_err());
        assert!(pool.submit(&result_frame(1), |_| {}).is_err());
    }

    #[test]
    fn eof_without_error_is_fatal() {
        let mut pool: WorkerPool<serde_json::Value, u32> =
            WorkerPool::spawn(1, || Command::new("true")).unwrap();
        pool.submit(&result_frame(1), |_| {}).ok();
        let err = pool.drain().unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }
}
