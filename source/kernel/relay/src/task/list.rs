// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Intrusive doubly linked task lists over the task table
//! OWNERS: @kernel-sched-team
//! PUBLIC API: TaskList (head/tail/is_empty), TaskTable::{append, remove, detach, iter_list}
//! DEPENDS_ON: task::TaskTable, types::{ListId, TaskId}
//! INVARIANTS: A task is linked into at most one list; links and container agree
//!
//! Links are stored in the task slots themselves, so list membership costs no
//! memory beyond the table. Every mutation keeps three facts in step: the
//! neighbours' links, the list's head/tail, and the task's container tag.

use crate::types::{ListId, TaskId};

use super::TaskTable;

/// Head and tail of one FIFO of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskList {
    head: Option<TaskId>,
    tail: Option<TaskId>,
}

impl TaskList {
    pub const fn new() -> Self {
        Self { head: None, tail: None }
    }

    #[inline]
    pub const fn head(&self) -> Option<TaskId> {
        self.head
    }

    #[inline]
    pub const fn tail(&self) -> Option<TaskId> {
        self.tail
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Per-task membership record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) next: Option<TaskId>,
    pub(crate) prev: Option<TaskId>,
    pub(crate) container: Option<ListId>,
}

impl Link {
    pub(crate) const fn unlinked() -> Self {
        Self { next: None, prev: None, container: None }
    }
}

impl<C, const N: usize> TaskTable<C, N> {
    /// Appends `task` at the tail of `list`.
    ///
    /// Returns `false` and changes nothing when the task is unknown, already
    /// belongs to some list, or `list` names the waiters of an unknown task.
    pub fn append(&mut self, list: ListId, task: TaskId) -> bool {
        let Some(mut fifo) = self.list(list).copied() else {
            return false;
        };
        match self.link(task) {
            Some(link) if link.container.is_none() => {}
            _ => return false,
        }

        let old_tail = fifo.tail;
        if let Some(link) = self.link_mut(task) {
            *link = Link { next: None, prev: old_tail, container: Some(list) };
        }
        match old_tail {
            Some(tail) => {
                if let Some(link) = self.link_mut(tail) {
                    link.next = Some(task);
                }
            }
            None => fifo.head = Some(task),
        }
        fifo.tail = Some(task);
        self.store_list(list, fifo);
        true
    }

    /// Unlinks `task` from `list`.
    ///
    /// Returns `false` and changes nothing when the task is not a member of
    /// exactly that list.
    pub fn remove(&mut self, list: ListId, task: TaskId) -> bool {
        let Some(link) = self.link(task).copied() else {
            return false;
        };
        if link.container != Some(list) {
            return false;
        }
        let Some(mut fifo) = self.list(list).copied() else {
            return false;
        };

        match link.prev {
            Some(prev) => {
                if let Some(prev_link) = self.link_mut(prev) {
                    prev_link.next = link.next;
                }
            }
            None => fifo.head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(next_link) = self.link_mut(next) {
                    next_link.prev = link.prev;
                }
            }
            None => fifo.tail = link.prev,
        }
        if let Some(own) = self.link_mut(task) {
            *own = Link::unlinked();
        }
        self.store_list(list, fifo);
        true
    }

    /// Removes `task` from whatever list holds it. No-op when unlisted.
    pub fn detach(&mut self, task: TaskId) {
        if let Some(list) = self.container(task) {
            self.remove(list, task);
        }
    }

    /// Walks `list` from head to tail.
    pub fn iter_list(&self, list: ListId) -> ListIter<'_, C, N> {
        ListIter { table: self, cursor: self.list(list).and_then(TaskList::head) }
    }

    fn store_list(&mut self, list: ListId, fifo: TaskList) {
        if let Some(slot) = self.list_mut(list) {
            *slot = fifo;
        }
    }
}

/// Iterator returned by [`TaskTable::iter_list`].
pub struct ListIter<'a, C, const N: usize> {
    table: &'a TaskTable<C, N>,
    cursor: Option<TaskId>,
}

impl<C, const N: usize> Iterator for ListIter<'_, C, N> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let current = self.cursor?;
        self.cursor = self.table.next(current);
        Some(current)
    }
}

static_assertions::assert_impl_all!(TaskList: Copy, Send, Sync);
