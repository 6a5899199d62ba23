// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! System abstractions for cross-platform compatibility.
//!
//! This module provides platform-specific implementations of system functionality
//! that differs between native and WASM targets.

pub mod time {
    //! Time abstractions for cross-platform compatibility.
    //!
    //! The staging pool measures its backpressure wait with [Instant].  On native
    //! platforms this is `std::time`; on WASM it comes from `web_time`, since
    //! `std::time::Instant::now` panics there.

    #[cfg(not(target_arch = "wasm32"))]
    pub use std::time::{Duration, Instant};

    #[cfg(target_arch = "wasm32")]
    pub use web_time::{Duration, Instant};
}
