// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Millisecond tick counter, sleeping and periodic wakeups
//! OWNERS: @kernel-time-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + simulator scenarios (tests.rs)
//! PUBLIC API: Timer (new/start/run/tick/ticks/sleep_until/sleep), IntervalTimer, configure_hardware, deadline_reached
//! DEPENDS_ON: sched::Kernel, ipc (send/answer), relay_hal::ByteRegisters
//! INVARIANTS: Tick arithmetic wraps; a deadline counts as reached within DEADLINE_HORIZON after it
//!
//! A dedicated timer task owns all sleepers. Sleeping tasks send it the
//! address of their deadline and wait on its waiter list. Each tick the
//! interrupt handler bumps the counter and answers the timer task, which
//! walks its waiters, answers every one whose deadline has passed, and goes
//! back to waiting on its tick queue.
//!
//! Board wiring: call [`configure_hardware`] once, spawn the task with
//! `TIMER.start(timer_main, stack)` where `fn timer_main() -> ! { TIMER.run() }`,
//! and call `TIMER.tick()` from the TIMER2_COMPA interrupt vector.


use relay_hal::ByteRegisters;

use crate::arch::Arch;
use crate::config::{DEADLINE_HORIZON, TICK_HZ};
use crate::error::SpawnError;
use crate::sched::Kernel;
use crate::sync::IrqMutex;
use crate::types::{Message, QueueId, TaskEntry, TaskId};

/// Timer/Counter2 registers (data-space addresses).
pub mod regs {
    pub const TCCR2A: usize = 0xB0;
    pub const TCCR2B: usize = 0xB1;
    pub const OCR2A: usize = 0xB3;
    pub const TIMSK2: usize = 0x70;

    /// Clear timer on compare match.
    pub const TCCR2A_CTC: u8 = 0x02;
    /// clk/256 prescaler.
    pub const TCCR2B_CLK_256: u8 = 0x06;
    pub const TIMSK2_OCIE2A: u8 = 1 << 1;
}

/// True when `now` is at or past `deadline`, tolerating counter wrap.
#[inline]
pub const fn deadline_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < DEADLINE_HORIZON
}

/// Compare value for a `TICK_HZ` interrupt with the clk/256 prescaler.
pub const fn compare_value(cpu_hz: u32) -> u8 {
    (cpu_hz / TICK_HZ / 256).saturating_sub(1) as u8
}

/// Programs Timer/Counter2 for a `TICK_HZ` compare-match interrupt.
pub fn configure_hardware(regs: &impl ByteRegisters, cpu_hz: u32) {
    regs.write(regs::TCCR2A, regs::TCCR2A_CTC);
    regs.write(regs::TCCR2B, regs::TCCR2B_CLK_256);
    regs.write(regs::OCR2A, compare_value(cpu_hz));
    regs.write(regs::TIMSK2, regs::TIMSK2_OCIE2A);
}

/// Tick counter plus the timer task that wakes sleepers.
pub struct Timer<A: Arch, const N: usize> {
    kernel: &'static Kernel<A, N>,
    ticks: IrqMutex<u32>,
    tick_queue: QueueId,
    task: spin::Once<TaskId>,
}

impl<A: Arch, const N: usize> Timer<A, N> {
    /// `tick_queue` must be reserved for this timer.
    pub const fn new(kernel: &'static Kernel<A, N>, tick_queue: QueueId) -> Self {
        Self { kernel, ticks: IrqMutex::new(0), tick_queue, task: spin::Once::new() }
    }

    /// Spawns the timer task. `entry` must call [`Timer::run`].
    pub fn start(&self, entry: TaskEntry, stack: &'static mut [u8]) -> Result<TaskId, SpawnError> {
        let id = self.kernel.spawn("timer", entry, stack)?;
        self.task.call_once(|| id);
        Ok(id)
    }

    /// The timer task, once started.
    pub fn task(&self) -> Option<TaskId> {
        self.task.get().copied()
    }

    /// Milliseconds since start, wrapping.
    pub fn ticks(&self) -> u32 {
        *self.ticks.lock(self.kernel.arch())
    }

    /// Timer interrupt entry: advance the counter and release the timer task.
    pub fn tick(&self) {
        {
            let mut ticks = self.ticks.lock_masked();
            *ticks = ticks.wrapping_add(1);
        }
        if let Some(task) = self.kernel.list_head_from_isr(self.tick_queue) {
            self.kernel.answer(task, 0);
        }
    }

    /// Body of the timer task.
    pub fn run(&self) -> ! {
        let Some(me) = self.kernel.current() else {
            self.kernel.halt();
        };
        loop {
            self.wake_expired(me);
            self.kernel.send(self.tick_queue, 0);
        }
    }

    fn wake_expired(&self, me: TaskId) {
        let now = self.ticks();
        let mut cursor = self.kernel.waiters_head(me);
        while let Some(sleeper) = cursor {
            cursor = self.kernel.next(sleeper);
            let Some(message) = self.kernel.message(sleeper) else {
                continue;
            };
            // SAFETY: sleepers send the address of a `u32` on their own stack
            // and stay blocked, so the value is live until we answer.
            let deadline = unsafe { core::ptr::read(message as *const u32) };
            if deadline_reached(now, deadline) {
                self.kernel.answer(sleeper, 0);
            }
        }
    }

    /// Blocks the caller until the tick counter reaches `deadline`.
    ///
    /// Returns immediately if the timer task was never started.
    pub fn sleep_until(&self, deadline: u32) {
        let Some(timer) = self.task() else {
            log_warn!(target: "time", "sleep_until before the timer task started");
            return;
        };
        self.kernel.send(timer, &deadline as *const u32 as Message);
    }

    /// Blocks the caller for `ticks` milliseconds.
    pub fn sleep(&self, ticks: u32) {
        self.sleep_until(self.ticks().wrapping_add(ticks));
    }
}

/// Drift-free periodic wakeups: each deadline is the previous one plus the
/// interval, regardless of how late the task actually ran.
pub struct IntervalTimer<'t, A: Arch, const N: usize> {
    timer: &'t Timer<A, N>,
    deadline: u32,
    interval: u32,
}

impl<'t, A: Arch, const N: usize> IntervalTimer<'t, A, N> {
    /// First wakeup is `interval` ticks from now.
    pub fn new(timer: &'t Timer<A, N>, interval: u32) -> Self {
        Self { timer, deadline: timer.ticks().wrapping_add(interval), interval }
    }

    pub fn deadline(&self) -> u32 {
        self.deadline
    }

    pub fn wait(&mut self) {
        self.timer.sleep_until(self.deadline);
        self.deadline = self.deadline.wrapping_add(self.interval);
    }
}
