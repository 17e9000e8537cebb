// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fixed-capacity task table and the kernel-owned task lists
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + proptest list model (tests_prop.rs)
//! PUBLIC API: TaskTable (insert/get/contains/next/prev/container/list/append/remove/detach), Task, TaskList
//! DEPENDS_ON: types::{TaskId, ListId, QueueId, Message}, config::MAX_QUEUES, error::SpawnError
//! INVARIANTS: Slots are never freed; each task is linked into at most one list
//!
//! The table is an arena indexed by [`TaskId`]. It also owns every list head:
//! the ready list, the receiver list, one waiter list per task and the
//! free-standing queues. Keeping them together lets a single lock protect the
//! whole scheduling state.

mod list;

#[cfg(test)]
mod tests_prop;

pub use list::{ListIter, TaskList};

use crate::config::MAX_QUEUES;
use crate::error::SpawnError;
use crate::types::{ListId, Message, TaskId};

use list::Link;

/// One task slot.
pub struct Task<C> {
    name: &'static str,
    context: C,
    link: Link,
    waiters: TaskList,
    message: Message,
}

impl<C> Task<C> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn message(&self) -> Message {
        self.message
    }

    pub fn container(&self) -> Option<ListId> {
        self.link.container
    }

    /// Senders waiting on this task.
    pub fn waiters(&self) -> &TaskList {
        &self.waiters
    }
}

/// Arena of up to `N` tasks plus the list heads that thread through it.
pub struct TaskTable<C, const N: usize> {
    slots: [Option<Task<C>>; N],
    len: usize,
    ready: TaskList,
    receivers: TaskList,
    queues: [TaskList; MAX_QUEUES],
}

impl<C, const N: usize> TaskTable<C, N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
            len: 0,
            ready: TaskList::new(),
            receivers: TaskList::new(),
            queues: [TaskList::new(); MAX_QUEUES],
        }
    }

    /// Stores a new, unlisted task and returns its handle.
    pub fn insert(&mut self, name: &'static str, context: C) -> Result<TaskId, SpawnError> {
        let full = SpawnError::TableFull { capacity: N };
        if self.len >= N {
            return Err(full);
        }
        let raw = u8::try_from(self.len).map_err(|_| full)?;
        self.slots[self.len] = Some(Task {
            name,
            context,
            link: Link::unlinked(),
            waiters: TaskList::new(),
            message: 0,
        });
        self.len += 1;
        Ok(TaskId::from_raw(raw))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn get(&self, task: TaskId) -> Option<&Task<C>> {
        self.slots.get(task.as_index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, task: TaskId) -> Option<&mut Task<C>> {
        self.slots.get_mut(task.as_index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.get(task).is_some()
    }

    /// Handles of every stored task, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(index, _)| u8::try_from(index).ok().map(TaskId::from_raw))
    }

    pub fn next(&self, task: TaskId) -> Option<TaskId> {
        self.link(task).and_then(|link| link.next)
    }

    pub fn prev(&self, task: TaskId) -> Option<TaskId> {
        self.link(task).and_then(|link| link.prev)
    }

    pub fn container(&self, task: TaskId) -> Option<ListId> {
        self.link(task).and_then(|link| link.container)
    }

    pub fn is_listed(&self, task: TaskId) -> bool {
        self.container(task).is_some()
    }

    /// True when `task` is the only member of `list`.
    pub fn is_sole_member(&self, task: TaskId, list: ListId) -> bool {
        self.link(task).is_some_and(|link| {
            link.container == Some(list) && link.next.is_none() && link.prev.is_none()
        })
    }

    pub fn message(&self, task: TaskId) -> Option<Message> {
        self.get(task).map(Task::message)
    }

    pub fn set_message(&mut self, task: TaskId, message: Message) -> bool {
        match self.get_mut(task) {
            Some(slot) => {
                slot.message = message;
                true
            }
            None => false,
        }
    }

    pub fn context(&self, task: TaskId) -> Option<&C> {
        self.get(task).map(Task::context)
    }

    /// Raw pointer to a task's saved context, for the context switch.
    pub(crate) fn context_ptr(&mut self, task: TaskId) -> Option<*mut C> {
        self.get_mut(task).map(|slot| &mut slot.context as *mut C)
    }

    /// Returns the list head record, or `None` for the waiters of an unknown task.
    pub fn list(&self, list: ListId) -> Option<&TaskList> {
        match list {
            ListId::Ready => Some(&self.ready),
            ListId::Receivers => Some(&self.receivers),
            ListId::Queue(queue) => self.queues.get(queue.as_index()),
            ListId::Waiters(owner) => self.get(owner).map(Task::waiters),
        }
    }

    pub(crate) fn list_mut(&mut self, list: ListId) -> Option<&mut TaskList> {
        match list {
            ListId::Ready => Some(&mut self.ready),
            ListId::Receivers => Some(&mut self.receivers),
            ListId::Queue(queue) => self.queues.get_mut(queue.as_index()),
            ListId::Waiters(owner) => self.get_mut(owner).map(|slot| &mut slot.waiters),
        }
    }

    pub fn list_head(&self, list: ListId) -> Option<TaskId> {
        self.list(list).and_then(TaskList::head)
    }

    pub fn list_tail(&self, list: ListId) -> Option<TaskId> {
        self.list(list).and_then(TaskList::tail)
    }

    /// Unknown lists count as empty.
    pub fn list_is_empty(&self, list: ListId) -> bool {
        self.list(list).map_or(true, TaskList::is_empty)
    }

    fn link(&self, task: TaskId) -> Option<&Link> {
        self.get(task).map(|slot| &slot.link)
    }

    fn link_mut(&mut self, task: TaskId) -> Option<&mut Link> {
        self.get_mut(task).map(|slot| &mut slot.link)
    }
}

impl<C, const N: usize> Default for TaskTable<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueueId;

    const Q0: QueueId = QueueId::new(0);

    fn table_with(count: usize) -> (TaskTable<(), 4>, [TaskId; 4]) {
        let mut table = TaskTable::new();
        let mut ids = [TaskId::from_raw(0); 4];
        for (i, slot) in ids.iter_mut().enumerate().take(count) {
            *slot = table.insert("t", ()).expect("insert");
            assert_eq!(slot.as_index(), i);
        }
        (table, ids)
    }

    fn members(table: &TaskTable<(), 4>, list: ListId) -> Vec<TaskId> {
        table.iter_list(list).collect()
    }

    #[test]
    fn insert_reports_full_table() {
        let (mut table, _) = table_with(4);
        assert_eq!(table.insert("extra", ()), Err(SpawnError::TableFull { capacity: 4 }));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn append_keeps_fifo_order() {
        let (mut table, [a, b, c, _]) = table_with(3);
        assert!(table.append(ListId::Ready, a));
        assert!(table.append(ListId::Ready, b));
        assert!(table.append(ListId::Ready, c));
        assert_eq!(members(&table, ListId::Ready), vec![a, b, c]);
        assert_eq!(table.list_head(ListId::Ready), Some(a));
        assert_eq!(table.list_tail(ListId::Ready), Some(c));
        assert_eq!(table.prev(b), Some(a));
        assert_eq!(table.next(b), Some(c));
    }

    #[test]
    fn append_refuses_listed_task() {
        let (mut table, [a, ..]) = table_with(1);
        assert!(table.append(ListId::Ready, a));
        assert!(!table.append(ListId::Ready, a));
        assert!(!table.append(ListId::Queue(Q0), a));
        assert_eq!(members(&table, ListId::Ready), vec![a]);
        assert!(table.list_is_empty(ListId::Queue(Q0)));
    }

    #[test]
    fn remove_from_wrong_list_is_noop() {
        let (mut table, [a, ..]) = table_with(1);
        table.append(ListId::Ready, a);
        assert!(!table.remove(ListId::Receivers, a));
        assert_eq!(table.container(a), Some(ListId::Ready));
    }

    #[test]
    fn remove_middle_relinks_neighbours() {
        let (mut table, [a, b, c, _]) = table_with(3);
        for id in [a, b, c] {
            table.append(ListId::Queue(Q0), id);
        }
        assert!(table.remove(ListId::Queue(Q0), b));
        assert_eq!(members(&table, ListId::Queue(Q0)), vec![a, c]);
        assert_eq!(table.next(a), Some(c));
        assert_eq!(table.prev(c), Some(a));
        assert!(!table.is_listed(b));
        assert_eq!(table.next(b), None);
    }

    #[test]
    fn remove_last_member_empties_list() {
        let (mut table, [a, ..]) = table_with(1);
        table.append(ListId::Receivers, a);
        assert!(table.remove(ListId::Receivers, a));
        assert!(table.list_is_empty(ListId::Receivers));
        assert_eq!(table.list_tail(ListId::Receivers), None);
    }

    #[test]
    fn detach_unlisted_task_is_noop() {
        let (mut table, [a, b, ..]) = table_with(2);
        table.append(ListId::Ready, b);
        table.detach(a);
        assert_eq!(members(&table, ListId::Ready), vec![b]);
    }

    #[test]
    fn waiter_lists_live_in_their_owner() {
        let (mut table, [a, b, c, _]) = table_with(3);
        table.append(ListId::Ready, a);
        assert!(table.append(ListId::Waiters(a), b));
        assert!(table.append(ListId::Waiters(a), c));
        assert_eq!(table.list_head(ListId::Waiters(a)), Some(b));
        assert_eq!(table.get(a).map(|t| t.waiters().tail()), Some(Some(c)));
        // Waiters of a task that does not exist cannot be addressed.
        let ghost = TaskId::from_raw(3);
        assert!(!table.append(ListId::Waiters(ghost), a));
        assert!(table.list_is_empty(ListId::Waiters(ghost)));
    }

    #[test]
    fn sole_member_needs_empty_neighbours() {
        let (mut table, [a, b, ..]) = table_with(2);
        table.append(ListId::Ready, a);
        assert!(table.is_sole_member(a, ListId::Ready));
        table.append(ListId::Ready, b);
        assert!(!table.is_sole_member(a, ListId::Ready));
        assert!(!table.is_sole_member(a, ListId::Receivers));
    }

    #[test]
    fn message_slot_is_per_task() {
        let (mut table, [a, b, ..]) = table_with(2);
        assert!(table.set_message(a, 42));
        assert_eq!(table.message(a), Some(42));
        assert_eq!(table.message(b), Some(0));
        assert!(!table.set_message(TaskId::from_raw(3), 1));
    }
}
