use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use sph_core::scheduler::RayonScheduler;
use sph_core::scheduler::{parallel_for, parallel_for_each_mut, ThreadLocal};
use sph_core::{Scheduler, SequentialScheduler};

fn schedulers() -> Vec<(&'static str, Box<dyn Scheduler>)> {
    #[allow(unused_mut)]
    let mut schedulers: Vec<(&'static str, Box<dyn Scheduler>)> =
        vec![("sequential", Box::new(SequentialScheduler))];
    #[cfg(feature = "parallel")]
    schedulers.push(("rayon", Box::new(RayonScheduler::with_threads(4).unwrap())));
    schedulers
}

#[test]
fn test_each_slot_written_once() {
    for (name, scheduler) in schedulers() {
        let mut values = vec![0_usize; 10_001];
        parallel_for_each_mut(scheduler.as_ref(), &mut values, 64, |i, v| *v += i + 1);
        assert!(
            values.iter().enumerate().all(|(i, &v)| v == i + 1),
            "{} scheduler wrote a slot twice",
            name
        );
    }
}

#[test]
fn test_thread_local_scratch_reduces_to_total() {
    for (name, scheduler) in schedulers() {
        let scheduler = scheduler.as_ref();
        let scratch = ThreadLocal::new(scheduler, || 0_u64);
        parallel_for(scheduler, 0, 5000, 10, |i| {
            scratch.with(scheduler, |sum| *sum += i as u64);
        });
        let total: u64 = scratch.into_values().sum();
        assert_eq!(total, 4999 * 5000 / 2, "{} scheduler lost updates", name);
    }
}

#[test]
fn test_parallel_invoke_runs_both() {
    for (name, scheduler) in schedulers() {
        let counter = AtomicUsize::new(0);
        let (mut a, mut b) = (
            || {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            || {
                counter.fetch_add(10, Ordering::Relaxed);
            },
        );
        scheduler.parallel_invoke(&mut a, &mut b);
        assert_eq!(counter.load(Ordering::Relaxed), 11, "{}", name);
    }
}

#[test]
fn test_empty_range() {
    for (_, scheduler) in schedulers() {
        parallel_for(scheduler.as_ref(), 5, 5, 1, |_| panic!("body called on an empty range"));
        let mut empty: Vec<u8> = Vec::new();
        parallel_for_each_mut(scheduler.as_ref(), &mut empty, 1, |_, _| unreachable!());
    }
}
