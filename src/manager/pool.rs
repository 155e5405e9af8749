//! Bounded worker pool
//!
//! Fixed set of named threads draining a FIFO channel. Each submitted job
//! runs to completion on exactly one worker; queued jobs wait in arrival
//! order. Dropping the pool closes the channel and joins the workers, so
//! in-flight jobs get to finish before shutdown.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a pool with `size` workers (minimum 1)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|i| {
                let rx = Arc::clone(&rx);
                Builder::new()
                    .name(format!("trainer-{i}"))
                    .spawn(move || worker_loop(&rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a job; it runs as soon as a worker is free
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            // A send error means the pool is shutting down; the job is
            // dropped, matching abandoned-at-shutdown semantics.
            let _ = tx.send(Box::new(job));
        }
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        match job {
            Ok(job) => job(),
            Err(_) => break, // channel closed
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
