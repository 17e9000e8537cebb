// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Scheduler scenarios that poll for completion instead of waiting for idle sleep
//! OWNERS: @kernel-sched-team
//! NOTE: Tests only. Built with and without the `idle-sleep` feature; without
//!       it the idle task spins through `yield_now` and never sleeps, so
//!       `Sim::settle` cannot be used here.
//!
//! TEST_SCOPE:
//!   - Rendezvous and round robin while idle only yields
//!   - Idle holding the CPU once every task has detached
//!
//! TEST_SCENARIOS:
//!   - rendezvous_completes_with_spinning_idle(): client gets its answer, idle ends up alone

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::arch::sim::{launch, leak_stack, Sim};
use crate::sched::Kernel;
use crate::types::{ListId, TaskId};

const STACK: usize = 128;

fn wait_until(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn rendezvous_completes_with_spinning_idle() {
    static KERNEL: Kernel<Sim, 3> = Kernel::new(Sim::new());
    static REPLY: AtomicUsize = AtomicUsize::new(0);
    static DONE: AtomicBool = AtomicBool::new(false);
    const SERVER: TaskId = TaskId::from_raw(0);

    fn server() -> ! {
        loop {
            let from = KERNEL.receive();
            let doubled = KERNEL.message(from).unwrap_or(0) * 2;
            KERNEL.answer(from, doubled);
        }
    }
    fn client() -> ! {
        REPLY.store(KERNEL.send(SERVER, 21), Ordering::SeqCst);
        for _ in 0..3 {
            KERNEL.yield_now();
        }
        DONE.store(true, Ordering::SeqCst);
        loop {
            KERNEL.detach_and_yield();
        }
    }
    fn idle() -> ! {
        KERNEL.idle_loop()
    }

    assert_eq!(KERNEL.spawn("server", server, leak_stack(STACK)), Ok(SERVER));
    let client_id = KERNEL.spawn("client", client, leak_stack(STACK)).expect("spawn");
    launch(&KERNEL, idle);

    wait_until("client", || DONE.load(Ordering::SeqCst));
    assert_eq!(REPLY.load(Ordering::SeqCst), 42);

    wait_until("idle alone", || {
        let idle = KERNEL.idle_task();
        idle.is_some()
            && KERNEL.list_head(ListId::Ready) == idle
            && KERNEL.list_tail(ListId::Ready) == idle
    });
    assert_eq!(KERNEL.container(client_id), None);
    assert_eq!(KERNEL.container(SERVER), Some(ListId::Receivers));
    #[cfg(not(feature = "idle-sleep"))]
    assert!(!KERNEL.arch().sleep_armed());
}
