//! A small executor seam (spec §9 "Concurrency via implicit task
//! submission"): "the optimization pipeline is pure per-method, so
//! parallelism is trivial once the wave partition is computed." The
//! wave scheduler only needs `submit-all, wait-for-all`; it never
//! reaches for a thread directly.

/// Runs a batch of independent closures to completion, in any order,
/// returning each result in the corresponding position. Implementations
/// choose threads or work-stealing; [crate::waves::WaveScheduler] is
/// agnostic to which.
pub trait Executor: Send + Sync {
    fn run_all<T: Send>(&self, tasks: Vec<Box<dyn FnOnce() -> T + Send>>) -> Vec<T>;
}

/// Default executor: a rayon scope, matching spec §5's "parallel worker
/// threads with cooperative join at wave boundaries" — `rayon::scope`
/// joins all spawned tasks before returning, so a wave never observes a
/// straggler from the previous one.
pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn run_all<T: Send>(&self, tasks: Vec<Box<dyn FnOnce() -> T + Send>>) -> Vec<T> {
        let mut slots: Vec<Option<T>> = (0..tasks.len()).map(|_| None).collect();
        rayon::scope(|scope| {
            for (slot, task) in slots.iter_mut().zip(tasks) {
                scope.spawn(move |_| *slot = Some(task()));
            }
        });
        slots.into_iter().map(|slot| slot.expect("rayon::scope joins every spawned task")).collect()
    }
}

/// Runs every task on the calling thread, in order. Useful for tests and
/// for callers that want deterministic single-threaded compilation.
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn run_all<T: Send>(&self, tasks: Vec<Box<dyn FnOnce() -> T + Send>>) -> Vec<T> {
        tasks.into_iter().map(|task| task()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn the_sequential_executor_runs_every_task_and_preserves_order() {
        let executor = SequentialExecutor;
        let tasks: Vec<Box<dyn FnOnce() -> usize + Send>> = (0..5).map(|i| Box::new(move || i * i) as Box<dyn FnOnce() -> usize + Send>).collect();
        assert_eq!(executor.run_all(tasks), vec![0, 1, 4, 9, 16]);
    }

    #[test]
    fn the_rayon_executor_joins_every_spawned_task() {
        let executor = RayonExecutor;
        let counter = AtomicUsize::new(0);
        let tasks: Vec<Box<dyn FnOnce() -> usize + Send>> = (0..8)
            .map(|i| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    i
                }) as Box<dyn FnOnce() -> usize + Send>
            })
            .collect();
        let results = executor.run_all(tasks);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(results.len(), 8);
    }
}
