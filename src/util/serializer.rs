//! Control-plane work serializer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Task = Box<dyn FnOnce() + Send>;

/// Serializing executor for control-plane work.
///
/// `run` never blocks on other tasks: when the serializer is free, the task
/// executes inline on the calling thread; otherwise it is enqueued and the
/// thread currently draining runs it. Tasks never run concurrently, and
/// tasks submitted from one thread run in submission order. A task may call
/// `run` itself; the nested task is enqueued and runs after the current one
/// returns.
#[derive(Clone)]
pub struct WorkSerializer {
    inner: Arc<SerializerInner>,
}

struct SerializerInner {
    queue: Mutex<VecDeque<Task>>,
    // True while some thread is draining the queue. Only flipped with the
    // queue lock held, which keeps the handoff race-free.
    active: AtomicBool,
}

impl WorkSerializer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SerializerInner {
                queue: Mutex::new(VecDeque::new()),
                active: AtomicBool::new(false),
            }),
        }
    }

    /// Submit a task. Executes inline when the serializer is free.
    pub fn run(&self, task: impl FnOnce() + Send + 'static) {
        let should_drain = {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.push_back(Box::new(task));
            !self.inner.active.swap(true, Ordering::AcqRel)
        };
        if should_drain {
            self.drain();
        }
    }

    fn drain(&self) {
        loop {
            let task = {
                let mut queue = self.inner.queue.lock().unwrap();
                match queue.pop_front() {
                    Some(task) => task,
                    None => {
                        self.inner.active.store(false, Ordering::Release);
                        return;
                    }
                }
            };
            task();
        }
    }
}

impl Default for WorkSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_inline_when_free() {
        let serializer = WorkSerializer::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        serializer.run(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_preserves_submission_order() {
        let serializer = WorkSerializer::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = Arc::clone(&order);
            serializer.run(move || order.lock().unwrap().push(i));
        }
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_reentrant_run_is_deferred() {
        let serializer = WorkSerializer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let outer_order = Arc::clone(&order);
        let nested = serializer.clone();
        serializer.run(move || {
            outer_order.lock().unwrap().push("outer-start");
            let inner_order = Arc::clone(&outer_order);
            nested.run(move || inner_order.lock().unwrap().push("nested"));
            outer_order.lock().unwrap().push("outer-end");
        });

        assert_eq!(
            *order.lock().unwrap(),
            vec!["outer-start", "outer-end", "nested"]
        );
    }

    #[test]
    fn test_concurrent_submissions_all_run() {
        let serializer = WorkSerializer::new();
        let count = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let serializer = serializer.clone();
                let count = Arc::clone(&count);
                scope.spawn(move || {
                    for _ in 0..100 {
                        let count = Arc::clone(&count);
                        serializer.run(move || {
                            count.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(count.load(Ordering::SeqCst), 800);
    }
}
