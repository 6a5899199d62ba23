// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The aquarium frame loop and the scene it animates. */

pub use engine::{CreateError, Draw, Engine, FrameReport};

pub mod behavior;
pub(crate) mod engine;
pub mod options;
pub mod scene;

pub use behavior::BehaviorQueue;
pub use options::{AquariumOptions, Behavior, BehaviorOp};
