// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the task lists
//! OWNERS: @kernel-sched-team
//! NOTE: Tests only; no kernel logic. Drives random list operations against a Vec model.
//!
//! TEST_SCOPE:
//!   - FIFO order of every list after arbitrary append/remove/detach sequences
//!   - Single-membership: a task sits in at most one list
//!   - Link symmetry: backward walks mirror forward walks
//!
//! TEST_SCENARIOS:
//!   - lists_match_model(): table lists equal the model after every step
//!   - task_is_in_at_most_one_list(): walking all lists finds each task at most once

use std::collections::HashMap;

use proptest::prelude::*;

use super::TaskTable;
use crate::types::{ListId, QueueId, TaskId};

const TASKS: usize = 5;

#[derive(Debug, Clone, Copy)]
enum Op {
    Append(ListId, TaskId),
    Remove(ListId, TaskId),
    Detach(TaskId),
}

fn arb_task() -> impl Strategy<Value = TaskId> {
    (0u8..TASKS as u8).prop_map(TaskId::from_raw)
}

fn arb_list() -> impl Strategy<Value = ListId> {
    prop_oneof![
        Just(ListId::Ready),
        Just(ListId::Receivers),
        (0u8..2).prop_map(|q| ListId::Queue(QueueId::new(q))),
        arb_task().prop_map(ListId::Waiters),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_list(), arb_task()).prop_map(|(l, t)| Op::Append(l, t)),
        (arb_list(), arb_task()).prop_map(|(l, t)| Op::Remove(l, t)),
        arb_task().prop_map(Op::Detach),
    ]
}

fn all_lists() -> Vec<ListId> {
    let mut lists = vec![
        ListId::Ready,
        ListId::Receivers,
        ListId::Queue(QueueId::new(0)),
        ListId::Queue(QueueId::new(1)),
    ];
    lists.extend((0..TASKS as u8).map(|t| ListId::Waiters(TaskId::from_raw(t))));
    lists
}

fn fresh_table() -> TaskTable<(), TASKS> {
    let mut table = TaskTable::new();
    for _ in 0..TASKS {
        table.insert("p", ()).expect("insert");
    }
    table
}

#[derive(Default)]
struct Model {
    lists: HashMap<ListId, Vec<TaskId>>,
    container: HashMap<TaskId, ListId>,
}

impl Model {
    fn apply(&mut self, op: Op) -> Option<bool> {
        match op {
            Op::Append(list, task) => {
                let ok = !self.container.contains_key(&task);
                if ok {
                    self.container.insert(task, list);
                    self.lists.entry(list).or_default().push(task);
                }
                Some(ok)
            }
            Op::Remove(list, task) => {
                let ok = self.container.get(&task) == Some(&list);
                if ok {
                    self.unlink(list, task);
                }
                Some(ok)
            }
            Op::Detach(task) => {
                if let Some(list) = self.container.get(&task).copied() {
                    self.unlink(list, task);
                }
                None
            }
        }
    }

    fn unlink(&mut self, list: ListId, task: TaskId) {
        self.container.remove(&task);
        if let Some(members) = self.lists.get_mut(&list) {
            members.retain(|t| *t != task);
        }
    }
}

fn apply_to_table(table: &mut TaskTable<(), TASKS>, op: Op) -> Option<bool> {
    match op {
        Op::Append(list, task) => Some(table.append(list, task)),
        Op::Remove(list, task) => Some(table.remove(list, task)),
        Op::Detach(task) => {
            table.detach(task);
            None
        }
    }
}

fn backward(table: &TaskTable<(), TASKS>, list: ListId) -> Vec<TaskId> {
    let mut out = Vec::new();
    let mut cursor = table.list_tail(list);
    while let Some(task) = cursor {
        out.push(task);
        cursor = table.prev(task);
    }
    out.reverse();
    out
}

proptest! {
    #[test]
    fn lists_match_model(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let mut table = fresh_table();
        let mut model = Model::default();
        for op in ops {
            prop_assert_eq!(apply_to_table(&mut table, op), model.apply(op), "op {:?}", op);
            for list in all_lists() {
                let expected = model.lists.get(&list).cloned().unwrap_or_default();
                let forward: Vec<TaskId> = table.iter_list(list).collect();
                prop_assert_eq!(&forward, &expected, "forward walk of {:?}", list);
                prop_assert_eq!(backward(&table, list), expected, "backward walk of {:?}", list);
            }
            for raw in 0..TASKS as u8 {
                let task = TaskId::from_raw(raw);
                prop_assert_eq!(table.container(task), model.container.get(&task).copied());
            }
        }
    }

    #[test]
    fn task_is_in_at_most_one_list(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let mut table = fresh_table();
        for op in ops {
            apply_to_table(&mut table, op);
        }
        let mut seen = HashMap::new();
        for list in all_lists() {
            for task in table.iter_list(list) {
                prop_assert!(seen.insert(task, list).is_none(), "{:?} listed twice", task);
                prop_assert_eq!(table.container(task), Some(list));
            }
        }
        for raw in 0..TASKS as u8 {
            let task = TaskId::from_raw(raw);
            prop_assert_eq!(table.is_listed(task), seen.contains_key(&task));
        }
    }
}
