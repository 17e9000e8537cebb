// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Rendezvous messaging: send / receive / answer
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Scenario tests on the simulator backend (tests.rs)
//! PUBLIC API: Kernel::{send, receive, answer, answer_void}, Recipient
//! DEPENDS_ON: sched::Kernel, task::TaskTable
//! INVARIANTS: A sender stays blocked until answered; waiters are served FIFO;
//!             `receive` does not dequeue, only `answer` does
//!
//! A send parks the caller on the recipient's waiter list (or on a queue) with
//! the message in its slot. The recipient later calls `receive` to learn who
//! is waiting, reads the message with `Kernel::message`, and `answer`s. The
//! answer overwrites the sender's slot and makes it runnable again; `send`
//! then returns that value. Interrupt handlers answer tasks waiting on queues.


use crate::arch::Arch;
use crate::sched::Kernel;
use crate::types::{ListId, Message, QueueId, TaskId};

/// Destination of a `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Another task; the sender joins its waiter list.
    Task(TaskId),
    /// A free-standing queue served by a driver or the timer.
    Queue(QueueId),
}

impl Recipient {
    fn list(self) -> ListId {
        match self {
            Recipient::Task(task) => ListId::Waiters(task),
            Recipient::Queue(queue) => ListId::Queue(queue),
        }
    }
}

impl From<TaskId> for Recipient {
    fn from(task: TaskId) -> Self {
        Recipient::Task(task)
    }
}

impl From<QueueId> for Recipient {
    fn from(queue: QueueId) -> Self {
        Recipient::Queue(queue)
    }
}

/// Outcome of one `receive` attempt under the lock.
enum ReceiveStep<P> {
    Sender(TaskId),
    Blocked(Option<P>),
    NotRunning,
}

impl<A: Arch, const N: usize> Kernel<A, N> {
    /// Sends `message` and blocks until the recipient answers. Returns the answer.
    ///
    /// Called outside a task (before tasking starts), or naming a task or
    /// queue that does not exist, it returns `message` unchanged.
    pub fn send(&self, to: impl Into<Recipient>, message: Message) -> Message {
        let to = to.into();
        let pair = self.critical(|s| {
            let me = s.current?;
            if s.table.list(to.list()).is_none() {
                log_warn!(target: "ipc", "send from {} to {:?} ignored: no such recipient", me, to);
                return None;
            }
            s.table.set_message(me, message);
            if let Recipient::Task(target) = to {
                if s.table.container(target) == Some(ListId::Receivers) {
                    s.table.detach(target);
                    s.make_ready(target);
                }
            }
            s.block_current(me, Some(to.list()))
        });
        self.perform(pair);
        self.critical(|s| s.current.and_then(|me| s.table.message(me))).unwrap_or(message)
    }

    /// Returns the first task waiting on the caller, blocking until one arrives.
    ///
    /// The sender stays queued until answered, so calling `receive` again
    /// without answering returns the same task.
    pub fn receive(&self) -> TaskId {
        loop {
            let step = self.critical(|s| {
                let Some(me) = s.current else {
                    return ReceiveStep::NotRunning;
                };
                match s.table.list_head(ListId::Waiters(me)) {
                    Some(sender) => ReceiveStep::Sender(sender),
                    None => ReceiveStep::Blocked(s.block_current(me, Some(ListId::Receivers))),
                }
            });
            match step {
                ReceiveStep::Sender(sender) => return sender,
                ReceiveStep::Blocked(Some(pair)) => self.perform(Some(pair)),
                ReceiveStep::Blocked(None) => {
                    // Nothing else can run, so no sender can ever arrive.
                    self.halt();
                }
                ReceiveStep::NotRunning => {
                    log_error!(target: "ipc", "receive called before tasking started");
                    self.halt();
                }
            }
        }
    }

    /// Stores `response` in `sender`'s message slot, takes it off whatever
    /// list it waits on and makes it runnable. Does not switch, so it is
    /// safe from interrupt handlers.
    pub fn answer(&self, sender: TaskId, response: Message) {
        self.critical(|s| {
            if s.table.set_message(sender, response) {
                s.table.detach(sender);
                s.make_ready(sender);
            }
        });
    }

    /// `answer` with a zero response.
    pub fn answer_void(&self, sender: TaskId) {
        self.answer(sender, 0);
    }
}
