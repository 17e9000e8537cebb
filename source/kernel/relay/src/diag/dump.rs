// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Human-readable dump of every task list
//! OWNERS: @kernel-team
//! PUBLIC API: Kernel::dump(&mut dyn fmt::Write)
//! DEPENDS_ON: sched::Kernel, arch::Arch::{stack_pointer, resume_address}
//! INVARIANTS: The kernel lock is released before any output is written
//!
//! The walk is captured into a fixed-size snapshot under the lock, then
//! printed. Writing may block (a serial writer sends messages), which must
//! never happen while the lock is held.
//!
//! Tasks that no top-level list reaches (senders caught in a waiter cycle,
//! and whoever waits on them) are printed last with the list holding them.

use core::fmt;

use crate::arch::Arch;
use crate::config::MAX_QUEUES;
use crate::sched::{Kernel, KernelState};
use crate::types::{ListId, QueueId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Ready,
    Receivers,
    Queue(QueueId),
    Unlisted,
    Unreachable,
}

#[derive(Clone, Copy)]
struct Row {
    section: Section,
    depth: u8,
    task: TaskId,
    name: &'static str,
    sp: usize,
    /// `None` for the running task.
    resume: Option<usize>,
    container: Option<ListId>,
}

struct Snapshot<const N: usize> {
    current: Option<(TaskId, &'static str)>,
    rows: [Option<Row>; N],
    len: usize,
    seen: [bool; N],
}

impl<const N: usize> Snapshot<N> {
    fn seen(&self, task: TaskId) -> bool {
        self.seen.get(task.as_index()).copied().unwrap_or(true)
    }

    fn push(&mut self, row: Row) {
        if let Some(seen) = self.seen.get_mut(row.task.as_index()) {
            *seen = true;
        }
        if let Some(slot) = self.rows.get_mut(self.len) {
            *slot = Some(row);
            self.len += 1;
        }
    }

    fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows[..self.len].iter().flatten()
    }
}

impl<A: Arch, const N: usize> Kernel<A, N> {
    /// Writes the current task, then every list with each task's waiters
    /// nested beneath it.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let snapshot = self.critical(|s| self.snapshot(s));

        writeln!(out, "--- relay task dump ---")?;
        match snapshot.current {
            Some((task, name)) => writeln!(out, "current: {task} {name}")?,
            None => writeln!(out, "current: none (tasking not started)")?,
        }
        let mut section = None;
        for row in snapshot.rows() {
            if section != Some(row.section) {
                section = Some(row.section);
                match row.section {
                    Section::Ready => writeln!(out, "ready:")?,
                    Section::Receivers => writeln!(out, "receiving:")?,
                    Section::Queue(queue) => writeln!(out, "{queue}:")?,
                    Section::Unlisted => writeln!(out, "detached:")?,
                    Section::Unreachable => writeln!(out, "blocked (unreachable):")?,
                }
            }
            for _ in 0..=row.depth {
                out.write_str("  ")?;
            }
            write!(out, "{} {} sp={:#06x}", row.task, row.name, row.sp)?;
            match row.resume {
                None => write!(out, " (you are here)")?,
                Some(address) => write!(out, " resume={address:#06x}")?,
            }
            match (row.section, row.container) {
                (Section::Unreachable, Some(list)) => writeln!(out, " in {list}")?,
                _ => writeln!(out)?,
            }
        }
        writeln!(out, "--- end of dump ---")
    }

    fn snapshot(&self, s: &KernelState<A::Context, N>) -> Snapshot<N> {
        let mut snap = Snapshot {
            current: s.current.and_then(|t| s.table.get(t).map(|task| (t, task.name()))),
            rows: [None; N],
            len: 0,
            seen: [false; N],
        };
        self.walk(s, &mut snap, Section::Ready, ListId::Ready, 0);
        self.walk(s, &mut snap, Section::Receivers, ListId::Receivers, 0);
        for raw in 0..MAX_QUEUES as u8 {
            let queue = QueueId::new(raw);
            self.walk(s, &mut snap, Section::Queue(queue), ListId::Queue(queue), 0);
        }
        for task in s.table.ids() {
            if !s.table.is_listed(task) {
                self.record(s, &mut snap, Section::Unlisted, task, 0);
                self.walk(s, &mut snap, Section::Unlisted, ListId::Waiters(task), 1);
            }
        }
        for task in s.table.ids() {
            if !snap.seen(task) {
                self.record(s, &mut snap, Section::Unreachable, task, 0);
                self.walk(s, &mut snap, Section::Unreachable, ListId::Waiters(task), 1);
            }
        }
        snap
    }

    fn walk(
        &self,
        s: &KernelState<A::Context, N>,
        snap: &mut Snapshot<N>,
        section: Section,
        list: ListId,
        depth: u8,
    ) {
        for task in s.table.iter_list(list) {
            if snap.seen(task) {
                continue;
            }
            self.record(s, snap, section, task, depth);
            self.walk(s, snap, section, ListId::Waiters(task), depth.saturating_add(1));
        }
    }

    fn record(
        &self,
        s: &KernelState<A::Context, N>,
        snap: &mut Snapshot<N>,
        section: Section,
        task: TaskId,
        depth: u8,
    ) {
        let Some(entry) = s.table.get(task) else {
            return;
        };
        let running = s.current == Some(task);
        snap.push(Row {
            section,
            depth,
            task,
            name: entry.name(),
            sp: self.arch().stack_pointer(entry.context()),
            resume: (!running).then(|| self.arch().resume_address(entry.context())),
            container: entry.container(),
        });
    }
}
