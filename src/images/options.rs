// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Runtime toggles for the aquarium.
*/

use crate::staging::{MapStrategy, PoolConfig};

/// Whether a scripted step adds or removes fish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorOp {
    Add,
    Remove,
}

/**
One scripted population change.

`frame` counts frames to wait after the previous step fired.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    pub frame: u32,
    pub op: BehaviorOp,
    pub count: usize,
}

impl Behavior {
    pub fn add(frame: u32, count: usize) -> Self {
        Behavior {
            frame,
            op: BehaviorOp::Add,
            count,
        }
    }

    pub fn remove(frame: u32, count: usize) -> Self {
        Behavior {
            frame,
            op: BehaviorOp::Remove,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AquariumOptions {
    /// Fish in the tank before any scripted change.
    pub fish_count: usize,
    /// Draw every fish through one bind group with a dynamic offset.
    pub dynamic_buffer_offset: bool,
    /// Reuse staging buffers across frames instead of creating them per allocation.
    pub buffer_mapping_async: bool,
    /// Run [AquariumOptions::behaviors].
    pub simulate_fish_come_and_go: bool,
    pub behaviors: Vec<Behavior>,
    /// Pool sizing.  The strategy is taken from `buffer_mapping_async`.
    pub pool: PoolConfig,
}

impl Default for AquariumOptions {
    fn default() -> Self {
        AquariumOptions {
            fish_count: 10_000,
            dynamic_buffer_offset: true,
            buffer_mapping_async: false,
            simulate_fish_come_and_go: false,
            behaviors: Vec::new(),
            pool: PoolConfig::default(),
        }
    }
}

impl AquariumOptions {
    /// The pool configuration with the strategy these options select.
    pub fn pool_config(&self) -> PoolConfig {
        let strategy = if self.buffer_mapping_async {
            MapStrategy::Async
        } else {
            MapStrategy::Sync
        };
        PoolConfig {
            strategy,
            ..self.pool.clone()
        }
    }
}
