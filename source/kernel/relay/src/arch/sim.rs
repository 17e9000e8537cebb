// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host simulator backend for scheduler and IPC tests
//! OWNERS: @kernel-arch-team
//! NOTE: Tests only. Each task runs on its own OS thread; exactly one thread
//!       holds the baton at any time, which models the single CPU.
//! PUBLIC API: Sim (new/interrupt/settle), SimContext, leak_stack, launch, boot
//! DEPENDS_ON: std::sync, std::thread, arch::avr::frame, sched::Kernel
//! INVARIANTS: Interrupt handlers only run while the idle task sleeps;
//!             each task resumes with its own interrupt flag, as the saved SREG does on AVR

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use super::avr::frame;
use super::{Arch, InterruptControl};
use crate::config::IDLE_STACK_BYTES;
use crate::error::SpawnError;
use crate::sched::Kernel;
use crate::types::TaskEntry;

/// Allocates a task stack that lives for the rest of the test process.
pub fn leak_stack(len: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; len].into_boxed_slice())
}

/// Enters tasking on a helper thread and returns at once.
pub fn launch<const N: usize>(kernel: &'static Kernel<Sim, N>, idle: TaskEntry) {
    let stack = leak_stack(IDLE_STACK_BYTES);
    thread::spawn(move || {
        kernel.start_tasking(idle, stack);
    });
}

/// Like [`launch`], then waits until every task has blocked and idle sleeps.
pub fn boot<const N: usize>(kernel: &'static Kernel<Sim, N>, idle: TaskEntry) {
    launch(kernel, idle);
    kernel.arch().settle();
}

/// Run permission of one task thread.
struct Baton {
    go: Mutex<bool>,
    signal: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self { go: Mutex::new(false), signal: Condvar::new() }
    }

    fn pass(&self) {
        let mut go = self.go.lock().expect("baton lock");
        *go = true;
        self.signal.notify_all();
    }

    fn take(&self) {
        let mut go = self.go.lock().expect("baton lock");
        while !*go {
            go = self.signal.wait(go).expect("baton wait");
        }
        *go = false;
    }
}

pub struct SimContext {
    baton: Arc<Baton>,
    sp: usize,
    entry: usize,
    /// Interrupt flag saved at the last switch away. New tasks start enabled.
    irq_enabled: AtomicBool,
}

struct Cpu {
    sleeping: bool,
    wake: bool,
}

/// Simulated single-core CPU.
pub struct Sim {
    cpu: Mutex<Cpu>,
    changed: Condvar,
    irq_enabled: AtomicBool,
    sleep_armed: AtomicBool,
}

impl Sim {
    pub const fn new() -> Self {
        Self {
            cpu: Mutex::new(Cpu { sleeping: false, wake: false }),
            changed: Condvar::new(),
            irq_enabled: AtomicBool::new(true),
            sleep_armed: AtomicBool::new(false),
        }
    }

    fn cpu(&self) -> MutexGuard<'_, Cpu> {
        self.cpu.lock().expect("cpu lock")
    }

    fn wait_until_sleeping(&self) -> MutexGuard<'_, Cpu> {
        let mut cpu = self.cpu();
        while !cpu.sleeping {
            cpu = self.changed.wait(cpu).expect("cpu wait");
        }
        cpu
    }

    /// Waits until every task is blocked and idle is asleep.
    pub fn settle(&self) {
        drop(self.wait_until_sleeping());
    }

    /// Runs `handler` as an interrupt service routine, then wakes the CPU.
    ///
    /// Blocks until the CPU is asleep, so handlers never race task code.
    pub fn interrupt<R>(&self, handler: impl FnOnce() -> R) -> R {
        drop(self.wait_until_sleeping());
        let was_enabled = self.irq_enabled.swap(false, Ordering::SeqCst);
        let result = handler();
        self.irq_enabled.store(was_enabled, Ordering::SeqCst);
        let mut cpu = self.cpu();
        cpu.sleeping = false;
        cpu.wake = true;
        self.changed.notify_all();
        result
    }

    pub fn sleep_armed(&self) -> bool {
        self.sleep_armed.load(Ordering::SeqCst)
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptControl for Sim {
    fn disable_interrupts(&self) -> bool {
        self.irq_enabled.swap(false, Ordering::SeqCst)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        if was_enabled {
            self.irq_enabled.store(true, Ordering::SeqCst);
        }
    }

    fn interrupts_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::SeqCst)
    }
}

impl Arch for Sim {
    type Context = SimContext;

    fn init_context(
        &self,
        entry: TaskEntry,
        stack: &'static mut [u8],
    ) -> Result<SimContext, SpawnError> {
        let sp = frame::build_initial_frame(stack, entry as usize as u16)?;
        let sp = stack.as_ptr() as usize + sp;
        let baton = Arc::new(Baton::new());
        let runner = Arc::clone(&baton);
        thread::Builder::new()
            .name("relay-task".into())
            .spawn(move || {
                runner.take();
                entry()
            })
            .expect("spawn task thread");
        Ok(SimContext { baton, sp, entry: entry as usize, irq_enabled: AtomicBool::new(true) })
    }

    unsafe fn switch(&self, from: *mut SimContext, to: *const SimContext) {
        // SAFETY: the caller owns both slots for the duration of the switch.
        let (from, to) = unsafe { (&*from, &*to) };
        from.irq_enabled.store(self.irq_enabled.load(Ordering::SeqCst), Ordering::SeqCst);
        self.irq_enabled.store(to.irq_enabled.load(Ordering::SeqCst), Ordering::SeqCst);
        let (from, to) = (Arc::clone(&from.baton), Arc::clone(&to.baton));
        to.pass();
        from.take();
    }

    unsafe fn restore(&self, to: *const SimContext) -> ! {
        // SAFETY: see `switch`.
        let to = unsafe { &*to };
        self.irq_enabled.store(to.irq_enabled.load(Ordering::SeqCst), Ordering::SeqCst);
        to.baton.pass();
        loop {
            thread::park();
        }
    }

    fn arm_sleep(&self) {
        self.sleep_armed.store(true, Ordering::SeqCst);
    }

    fn disarm_sleep(&self) {
        self.sleep_armed.store(false, Ordering::SeqCst);
    }

    fn wait_for_interrupt(&self) {
        let mut cpu = self.cpu();
        cpu.sleeping = true;
        cpu.wake = false;
        self.irq_enabled.store(true, Ordering::SeqCst);
        self.changed.notify_all();
        while !cpu.wake {
            cpu = self.changed.wait(cpu).expect("cpu wait");
        }
        cpu.wake = false;
    }

    fn stack_pointer(&self, context: &SimContext) -> usize {
        context.sp
    }

    fn resume_address(&self, context: &SimContext) -> usize {
        context.entry
    }
}
