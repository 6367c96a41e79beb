use std::{
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread,
};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads executing blocking HTTP exchanges.
pub struct ThreadPool {
    // Held so the workers are not detached on creation; never joined.
    #[allow(dead_code)]
    workers: Vec<thread::JoinHandle<()>>,
    sender: Option<mpsc::Sender<Task>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(size);

        for index in 0..size.max(1) {
            let rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("jsonfetch-worker-{}", index))
                .spawn(move || loop {
                    let next = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
                    match next {
                        // tasks run user callbacks; a panic must not take the worker down
                        Ok(task) => {
                            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                                log::warn!("fetch worker {} recovered from a panicking task", index);
                            }
                        }
                        Err(_) => break,
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::warn!("failed to spawn fetch worker {}: {}", index, e),
            }
        }
        log::debug!("started {} fetch workers", workers.len());

        ThreadPool {
            workers,
            sender: Some(tx),
        }
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(f)).is_err() {
                log::warn!("fetch worker pool has shut down, dropping task");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel lets workers exit once the queue drains. Queued
        // requests still complete.
        self.sender.take();
    }
}
