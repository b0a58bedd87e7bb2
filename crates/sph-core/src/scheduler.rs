use std::sync::{Mutex, PoisonError};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Executes loops over index ranges, possibly in parallel.
///
/// Implementations never impose an ordering on the invocations of a loop body; bodies must
/// only write to slots owned by their iteration index or to per-thread scratch.
pub trait Scheduler: Sync {
    /// Number of worker threads executing the loop bodies.
    fn thread_count(&self) -> usize;

    /// Index of the calling worker in `0..thread_count()`, `None` outside of the workers.
    fn thread_index(&self) -> Option<usize>;

    /// Chunk size that keeps all workers busy without excessive overhead.
    fn recommended_granularity(&self) -> usize {
        1000
    }

    /// Calls `body(chunk_from, chunk_to)` for sub-ranges of `[from, to)` of at most
    /// `granularity` indices.
    fn parallel_for_chunks(
        &self,
        from: usize,
        to: usize,
        granularity: usize,
        body: &(dyn Fn(usize, usize) + Sync),
    );

    /// Runs two tasks, possibly concurrently, and returns when both are done.
    fn parallel_invoke(&self, a: &mut (dyn FnMut() + Send), b: &mut (dyn FnMut() + Send));
}

/// Runs everything on the calling thread, in index order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn thread_count(&self) -> usize {
        1
    }

    fn thread_index(&self) -> Option<usize> {
        Some(0)
    }

    fn parallel_for_chunks(
        &self,
        from: usize,
        to: usize,
        granularity: usize,
        body: &(dyn Fn(usize, usize) + Sync),
    ) {
        let step = granularity.max(1);
        let mut start = from;
        while start < to {
            let end = (start + step).min(to);
            body(start, end);
            start = end;
        }
    }

    fn parallel_invoke(&self, a: &mut (dyn FnMut() + Send), b: &mut (dyn FnMut() + Send)) {
        a();
        b();
    }
}

/// Work-stealing scheduler on top of a rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Default)]
pub struct RayonScheduler {
    pool: Option<rayon::ThreadPool>,
}

#[cfg(feature = "parallel")]
impl RayonScheduler {
    /// Scheduler using the global rayon pool.
    pub const fn global() -> Self {
        Self { pool: None }
    }

    /// Scheduler with its own pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { pool: Some(pool) })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

#[cfg(feature = "parallel")]
impl Scheduler for RayonScheduler {
    fn thread_count(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn thread_index(&self) -> Option<usize> {
        match &self.pool {
            Some(pool) => pool.current_thread_index(),
            None => rayon::current_thread_index(),
        }
    }

    fn recommended_granularity(&self) -> usize {
        100
    }

    fn parallel_for_chunks(
        &self,
        from: usize,
        to: usize,
        granularity: usize,
        body: &(dyn Fn(usize, usize) + Sync),
    ) {
        if from >= to {
            return;
        }
        let step = granularity.max(1);
        let chunk_count = (to - from).div_ceil(step);
        self.install(|| {
            (0..chunk_count).into_par_iter().for_each(|chunk| {
                let start = from + chunk * step;
                body(start, (start + step).min(to));
            })
        });
    }

    fn parallel_invoke(&self, a: &mut (dyn FnMut() + Send), b: &mut (dyn FnMut() + Send)) {
        self.install(|| {
            rayon::join(|| a(), || b());
        });
    }
}

#[cfg(feature = "parallel")]
static GLOBAL: RayonScheduler = RayonScheduler::global();

/// Scheduler used when the caller does not provide one.
pub fn default_scheduler() -> &'static dyn Scheduler {
    #[cfg(feature = "parallel")]
    {
        &GLOBAL
    }
    #[cfg(not(feature = "parallel"))]
    {
        &SequentialScheduler
    }
}

/// Calls `body(i)` for every index of `[from, to)`.
pub fn parallel_for<F>(scheduler: &dyn Scheduler, from: usize, to: usize, granularity: usize, body: F)
where
    F: Fn(usize) + Sync,
{
    scheduler.parallel_for_chunks(from, to, granularity, &|start, end| {
        for i in start..end {
            body(i);
        }
    });
}

/// Calls `body(i, &mut values[i])` for every element; each element is visited by exactly one
/// invocation, so bodies may freely write to their own slot.
pub fn parallel_for_each_mut<T, F>(
    scheduler: &dyn Scheduler,
    values: &mut [T],
    granularity: usize,
    body: F,
) where
    T: Send,
    F: Fn(usize, &mut T) + Sync,
{
    let step = granularity.max(1);
    let chunks: Vec<Mutex<&mut [T]>> = values.chunks_mut(step).map(Mutex::new).collect();
    scheduler.parallel_for_chunks(0, chunks.len(), 1, &|start, end| {
        for c in start..end {
            let mut chunk = chunks[c].lock().unwrap_or_else(PoisonError::into_inner);
            for (k, value) in chunk.iter_mut().enumerate() {
                body(c * step + k, value);
            }
        }
    });
}

/// Per-thread scratch values of a scheduler, one extra slot serves callers outside the workers.
pub struct ThreadLocal<T> {
    slots: Vec<Mutex<T>>,
}

impl<T: Send> ThreadLocal<T> {
    pub fn new(scheduler: &dyn Scheduler, init: impl Fn() -> T) -> Self {
        let slots = (0..scheduler.thread_count() + 1)
            .map(|_| Mutex::new(init()))
            .collect();
        Self { slots }
    }

    /// Runs `f` with exclusive access to the slot of the calling thread.
    pub fn with<R>(&self, scheduler: &dyn Scheduler, f: impl FnOnce(&mut T) -> R) -> R {
        let last = self.slots.len() - 1;
        let idx = scheduler.thread_index().map_or(last, |i| i.min(last));
        let mut slot = self.slots[idx].lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    /// Consumes the scratch values, e.g. to reduce them into a single result.
    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.slots
            .into_iter()
            .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sequential_visits_in_order() {
        let visited = Mutex::new(Vec::new());
        parallel_for(&SequentialScheduler, 3, 10, 4, |i| {
            visited.lock().unwrap().push(i);
        });
        assert_eq!(visited.into_inner().unwrap(), (3..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_default_scheduler_visits_each_index_once() {
        let sum = AtomicUsize::new(0);
        parallel_for(default_scheduler(), 0, 1000, 7, |i| {
            sum.fetch_add(i, Ordering::Relaxed);
        });
        assert_eq!(sum.into_inner(), 999 * 1000 / 2);
    }
}
