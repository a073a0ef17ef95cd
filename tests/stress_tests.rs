//! Long-running churn of thread creation, exit and hand-off.

use std::cell::{Cell, RefCell};

use mykernel::{
    create_thread, exit_thread, get_thread, init_threads, init_threads_with, yield_thread,
    KernelConfig, SchedPolicy, FAILED, MAX_THREADS,
};

const ROUNDS: i32 = 1000;
const MAX: i32 = MAX_THREADS as i32;

fn for_each_policy(main: fn()) {
    for policy in [SchedPolicy::RoundRobin, SchedPolicy::Fifo] {
        init_threads_with(KernelConfig::new().with_policy(policy), main).unwrap();
    }
}

/// Five live threads per round, each replacing itself with one for the
/// next round. Slots 0-4 serve odd rounds and 5-9 even ones.
mod churn5 {
    use super::*;

    thread_local! {
        static TID_COUNTS: RefCell<[i32; MAX_THREADS]> = const { RefCell::new([0; MAX_THREADS]) };
    }

    fn worker(round: i32) {
        let tid = get_thread() as usize;
        TID_COUNTS.with(|c| c.borrow_mut()[tid] += 1);
        if round < ROUNDS {
            create_thread(worker, round + 1);
        } else {
            TID_COUNTS.with(|c| {
                let counts = c.borrow();
                assert_eq!(counts[tid], ROUNDS / 2, "T{tid}");
                let partner = (tid + 5) % MAX_THREADS;
                assert_eq!(counts[partner], ROUNDS / 2, "T{partner}");
            });
        }
        exit_thread();
    }

    #[test]
    fn stress_churn5() {
        for_each_policy(|| {
            TID_COUNTS.with(|c| *c.borrow_mut() = [0; MAX_THREADS]);
            for _ in 1..5 {
                create_thread(worker, 1);
            }
            worker(1);
        });
    }
}

/// Nine or ten threads alive at all times, so exactly one ID is ever free.
#[test]
fn stress_churn9() {
    fn worker(round: i32) {
        if round < ROUNDS {
            let created = create_thread(worker, round + 9);
            assert_eq!(created, (round + 8) % MAX, "round {round}");
        }
    }

    for_each_policy(|| {
        for i in 1..=8 {
            create_thread(worker, i + 1);
        }
        worker(1);
        exit_thread();
    });
}

/// At most two threads alive: each creates its successor and exits.
#[test]
fn stress_churn1() {
    fn worker(round: i32) {
        if round < ROUNDS {
            let created = create_thread(worker, round + 1);
            assert_eq!(created, round % MAX, "round {round}");
        }
    }

    for_each_policy(|| {
        worker(1);
        exit_thread();
    });
}

#[test]
fn stress_ping_pong() {
    const SWAPS: u64 = 10_000;

    fn pong(partner: i32) {
        for _ in 0..SWAPS {
            assert_eq!(yield_thread(partner), partner);
        }
    }

    let snapshot = init_threads(|| {
        let partner = create_thread(pong, get_thread());
        for _ in 0..SWAPS {
            assert_eq!(yield_thread(partner), partner);
        }
    })
    .unwrap();

    // Every yield is a switch, plus the hand-off when thread 0 exits.
    assert_eq!(snapshot.context_switches, 2 * SWAPS + 1);
    assert_eq!(snapshot.live_threads(), 0);
}

#[test]
fn stress_repeated_runs() {
    thread_local! {
        static FINISHED: Cell<u32> = const { Cell::new(0) };
    }

    fn worker(_: i32) {
        FINISHED.with(|f| f.set(f.get() + 1));
    }

    for _ in 0..200 {
        let snapshot = init_threads(|| {
            while create_thread(worker, 0) != FAILED {}
        })
        .unwrap();
        assert_eq!(snapshot.threads_created, MAX_THREADS as u64);
        assert_eq!(snapshot.creates_rejected, 1);
        assert_eq!(snapshot.live_threads(), 0);
    }
    assert_eq!(FINISHED.with(Cell::get), 200 * (MAX_THREADS as u32 - 1));
}
