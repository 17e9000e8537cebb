// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Cooperative round-robin scheduler and the kernel context
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Scenario tests on the simulator backend (tests.rs)
//! PUBLIC API: Kernel (new/create_task/spawn/schedule/yield_now/yield_to/detach_and_yield/start_tasking/idle_loop + list access)
//! DEPENDS_ON: arch::Arch, sync::IrqMutex, task::TaskTable
//! INVARIANTS: The running task stays on the ready list until it blocks;
//!             the idle task never blocks; switches happen only in yield/block paths
//!
//! There is no preemption. A task runs until it yields, blocks in IPC, or
//! detaches itself. Interrupt handlers may move tasks onto the ready list
//! (through `answer`) but never switch.

#[cfg(test)]
mod tests_poll;

use crate::arch::Arch;
use crate::error::SpawnError;
use crate::sync::IrqMutex;
use crate::task::TaskTable;
use crate::types::{ListId, Message, TaskEntry, TaskId};

/// Scheduling state guarded by the kernel lock.
pub(crate) struct KernelState<C, const N: usize> {
    pub(crate) table: TaskTable<C, N>,
    pub(crate) current: Option<TaskId>,
    pub(crate) idle: Option<TaskId>,
}

/// Context slots for one switch, computed under the lock and used after it.
pub(crate) struct SwitchPair<C> {
    from: *mut C,
    to: *const C,
}

impl<C, const N: usize> KernelState<C, N> {
    const fn new() -> Self {
        Self { table: TaskTable::new(), current: None, idle: None }
    }

    /// The task after `me` on the ready list, wrapping to the head.
    fn successor(&self, me: TaskId) -> Option<TaskId> {
        let after = match self.table.container(me) {
            Some(ListId::Ready) => self.table.next(me),
            _ => None,
        };
        after.or_else(|| self.table.list_head(ListId::Ready))
    }

    fn switch_to(&mut self, me: TaskId, next: TaskId) -> Option<SwitchPair<C>> {
        let from = self.table.context_ptr(me)?;
        let to = self.table.context_ptr(next)?;
        self.current = Some(next);
        Some(SwitchPair { from, to: to.cast_const() })
    }

    /// Moves the running task `me` off the ready list (onto `park`, if
    /// given) and selects the next task to run.
    ///
    /// Returns `None` and leaves `me` runnable when no other task could run.
    pub(crate) fn block_current(
        &mut self,
        me: TaskId,
        park: Option<ListId>,
    ) -> Option<SwitchPair<C>> {
        let after = match self.table.container(me) {
            Some(ListId::Ready) => self.table.next(me),
            _ => None,
        };
        self.table.detach(me);
        if let Some(list) = park {
            if !self.table.append(list, me) {
                log_warn!(target: "sched", "{} cannot park on {}: no such list", me, list);
                self.table.append(ListId::Ready, me);
                return None;
            }
        }
        match after.or_else(|| self.table.list_head(ListId::Ready)) {
            Some(next) => self.switch_to(me, next),
            None => {
                log_warn!(target: "sched", "{} cannot block: nothing else is runnable", me);
                self.table.detach(me);
                self.table.append(ListId::Ready, me);
                None
            }
        }
    }

    /// Puts `task` on the ready list. Already-listed tasks are left alone.
    pub(crate) fn make_ready(&mut self, task: TaskId) -> bool {
        self.table.append(ListId::Ready, task)
    }
}

/// The kernel: task table, list heads, current task and CPU backend.
///
/// Create one per chip as a `static` and hand out `&'static` references.
pub struct Kernel<A: Arch, const N: usize> {
    arch: A,
    state: IrqMutex<KernelState<A::Context, N>>,
}

impl<A: Arch, const N: usize> Kernel<A, N> {
    pub const fn new(arch: A) -> Self {
        Self { arch, state: IrqMutex::new(KernelState::new()) }
    }

    #[inline]
    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Runs `f` with interrupts masked and the kernel lock held.
    pub(crate) fn critical<R>(&self, f: impl FnOnce(&mut KernelState<A::Context, N>) -> R) -> R {
        let mut state = self.state.lock(&self.arch);
        f(&mut state)
    }

    /// Like [`critical`](Self::critical) for callers that already masked interrupts.
    pub(crate) fn critical_masked<R>(
        &self,
        f: impl FnOnce(&mut KernelState<A::Context, N>) -> R,
    ) -> R {
        let mut state = self.state.lock_masked();
        f(&mut state)
    }

    /// Performs a switch selected under the lock, after the lock is released.
    pub(crate) fn perform(&self, pair: Option<SwitchPair<A::Context>>) {
        if let Some(SwitchPair { from, to }) = pair {
            // SAFETY: `from` is the slot of the task executing this call and
            // `to` that of a suspended task. Slots are never freed, and a
            // context is only touched by its own task and the switch routine.
            unsafe { self.arch.switch(from, to) }
        }
    }

    /// Parks the CPU forever. Used when there is nothing left to run.
    pub(crate) fn halt(&self) -> ! {
        loop {
            self.arch.disable_interrupts();
            self.arch.wait_for_interrupt();
        }
    }

    /// Builds the initial context for `entry` on `stack` and registers the
    /// task. The task is not scheduled.
    pub fn create_task(
        &self,
        name: &'static str,
        entry: TaskEntry,
        stack: &'static mut [u8],
    ) -> Result<TaskId, SpawnError> {
        let stack_bytes = stack.len();
        let context = self.arch.init_context(entry, stack)?;
        let id = self.critical(|s| s.table.insert(name, context))?;
        log_debug!(target: "sched", "created {} '{}' ({} byte stack)", id, name, stack_bytes);
        Ok(id)
    }

    /// `create_task` followed by `schedule`.
    pub fn spawn(
        &self,
        name: &'static str,
        entry: TaskEntry,
        stack: &'static mut [u8],
    ) -> Result<TaskId, SpawnError> {
        let id = self.create_task(name, entry, stack)?;
        self.schedule(id);
        Ok(id)
    }

    /// Appends `task` to the ready list. No-op if it already sits in a list.
    pub fn schedule(&self, task: TaskId) {
        if !self.critical(|s| s.make_ready(task)) {
            log_debug!(target: "sched", "schedule({}) ignored: already listed", task);
        }
    }

    pub fn current(&self) -> Option<TaskId> {
        self.critical(|s| s.current)
    }

    pub fn is_runnable(&self, task: TaskId) -> bool {
        self.critical(|s| s.table.container(task) == Some(ListId::Ready))
    }

    /// Switches to the next ready task (round robin). Returns immediately
    /// when the caller is the only runnable task.
    pub fn yield_now(&self) {
        let pair = self.critical(|s| {
            let me = s.current?;
            let next = s.successor(me).filter(|next| *next != me)?;
            s.switch_to(me, next)
        });
        self.perform(pair);
    }

    /// Switches directly to `target`, leaving the caller's list membership
    /// unchanged. No-op when `target` is the caller or not runnable.
    pub fn yield_to(&self, target: TaskId) {
        let pair = self.critical(|s| {
            let me = s.current?;
            if target == me {
                return None;
            }
            if s.table.container(target) != Some(ListId::Ready) {
                log_debug!(target: "sched", "yield_to({}) ignored: not runnable", target);
                return None;
            }
            s.switch_to(me, target)
        });
        self.perform(pair);
    }

    /// Takes the caller off every list and runs the next task. The caller
    /// sleeps until someone schedules or answers it.
    pub fn detach_and_yield(&self) {
        let pair = self.critical(|s| {
            let me = s.current?;
            s.block_current(me, None)
        });
        self.perform(pair);
    }

    /// Creates the idle task, appends it to the ready list and resumes the
    /// ready head. Never returns.
    pub fn start_tasking(&self, idle_entry: TaskEntry, idle_stack: &'static mut [u8]) -> ! {
        if self.critical(|s| s.current.is_some()) {
            log_error!(target: "sched", "start_tasking called twice");
            self.halt();
        }
        let idle = match self.create_task("idle", idle_entry, idle_stack) {
            Ok(id) => id,
            Err(err) => {
                log_error!(target: "sched", "cannot create idle task: {}", err);
                self.halt();
            }
        };
        let first = self.critical(|s| {
            s.idle = Some(idle);
            s.make_ready(idle);
            let head = s.table.list_head(ListId::Ready)?;
            s.current = Some(head);
            s.table.context_ptr(head)
        });
        log_info!(target: "sched", "tasking started ({} tasks)", self.task_count());
        match first {
            // SAFETY: `first` was produced by `init_context` and nothing runs yet.
            Some(context) => unsafe { self.arch.restore(context) },
            None => self.halt(),
        }
    }

    /// Body of the idle task: sleep while nothing else is runnable, then yield.
    pub fn idle_loop(&self) -> ! {
        loop {
            #[cfg(feature = "idle-sleep")]
            self.sleep_if_alone();
            self.yield_now();
        }
    }

    #[cfg(feature = "idle-sleep")]
    fn sleep_if_alone(&self) {
        let was_enabled = self.arch.disable_interrupts();
        let alone = self.critical_masked(|s| {
            s.idle.is_some_and(|idle| s.table.is_sole_member(idle, ListId::Ready))
        });
        if alone {
            log_trace!(target: "sched", "idle: sleeping");
            self.arch.arm_sleep();
            self.arch.wait_for_interrupt();
            self.arch.disarm_sleep();
        } else {
            self.arch.restore_interrupts(was_enabled);
        }
    }

    pub fn list_head(&self, list: impl Into<ListId>) -> Option<TaskId> {
        let list = list.into();
        self.critical(|s| s.table.list_head(list))
    }

    pub fn list_tail(&self, list: impl Into<ListId>) -> Option<TaskId> {
        let list = list.into();
        self.critical(|s| s.table.list_tail(list))
    }

    pub fn list_is_empty(&self, list: impl Into<ListId>) -> bool {
        let list = list.into();
        self.critical(|s| s.table.list_is_empty(list))
    }

    /// Head of `list` without touching the interrupt flag. For interrupt
    /// handlers, where interrupts are already masked.
    pub fn list_head_from_isr(&self, list: impl Into<ListId>) -> Option<TaskId> {
        let list = list.into();
        self.critical_masked(|s| s.table.list_head(list))
    }

    pub fn next(&self, task: TaskId) -> Option<TaskId> {
        self.critical(|s| s.table.next(task))
    }

    pub fn prev(&self, task: TaskId) -> Option<TaskId> {
        self.critical(|s| s.table.prev(task))
    }

    /// List currently holding `task`.
    pub fn container(&self, task: TaskId) -> Option<ListId> {
        self.critical(|s| s.table.container(task))
    }

    /// First sender waiting on `task`.
    pub fn waiters_head(&self, task: TaskId) -> Option<TaskId> {
        self.list_head(ListId::Waiters(task))
    }

    pub fn message(&self, task: TaskId) -> Option<Message> {
        self.critical(|s| s.table.message(task))
    }

    pub fn set_message(&self, task: TaskId, message: Message) {
        self.critical(|s| s.table.set_message(task, message));
    }

    /// Removes `task` from whatever list holds it.
    pub fn detach(&self, task: TaskId) {
        self.critical(|s| s.table.detach(task));
    }

    /// Appends an unlisted `task` to `list`. Returns `false` if nothing changed.
    pub fn append_to(&self, list: impl Into<ListId>, task: TaskId) -> bool {
        let list = list.into();
        self.critical(|s| s.table.append(list, task))
    }

    pub fn remove_from(&self, list: impl Into<ListId>, task: TaskId) -> bool {
        let list = list.into();
        self.critical(|s| s.table.remove(list, task))
    }

    pub fn task_name(&self, task: TaskId) -> Option<&'static str> {
        self.critical(|s| s.table.get(task).map(|t| t.name()))
    }

    pub fn task_count(&self) -> usize {
        self.critical(|s| s.table.len())
    }

    pub fn idle_task(&self) -> Option<TaskId> {
        self.critical(|s| s.idle)
    }

    /// True once `start_tasking` has handed the CPU to a task.
    pub fn is_started(&self) -> bool {
        self.critical(|s| s.current).is_some()
    }

    /// Runs `f` on the task table with the kernel lock held.
    pub fn with_table<R>(&self, f: impl FnOnce(&TaskTable<A::Context, N>) -> R) -> R {
        self.critical(|s| f(&s.table))
    }
}

static_assertions::assert_not_impl_any!(SwitchPair<u8>: Send, Sync);
