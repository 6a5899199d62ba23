// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Per-instance uniform data and the bind groups that expose it to draws. */

pub mod instance_resources;
pub mod uniforms;

pub use instance_resources::{InstanceBinding, InstanceBindings, InstanceResources, Reallocation};
pub use uniforms::FishPer;
