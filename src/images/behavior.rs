// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Scripted fish population changes.
*/

use crate::images::options::{Behavior, BehaviorOp};
use std::collections::VecDeque;

/**
Steps through a [Behavior] script one frame at a time.

Only the head of the script counts down.  When its counter reaches zero it fires on the
next step and the following entry starts counting.
*/
#[derive(Debug, Clone, Default)]
pub struct BehaviorQueue {
    queue: VecDeque<Behavior>,
}

impl BehaviorQueue {
    pub fn new(behaviors: impl IntoIterator<Item = Behavior>) -> Self {
        BehaviorQueue {
            queue: behaviors.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Advances one frame and returns the resulting fish count.
    pub fn step(&mut self, fish_count: usize) -> usize {
        let Some(head) = self.queue.front_mut() else {
            return fish_count;
        };
        if head.frame > 0 {
            head.frame -= 1;
            return fish_count;
        }
        let fired = *head;
        self.queue.pop_front();
        let count = match fired.op {
            BehaviorOp::Add => fish_count.saturating_add(fired.count),
            BehaviorOp::Remove => fish_count.saturating_sub(fired.count),
        };
        logwise::info_sync!("Fish count {count}", count = count);
        count
    }
}
