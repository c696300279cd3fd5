//! This module groups the cage's calls by what they act on: the file
//! system, cages themselves, and the network.
//!
//! ## System Calls
//!
//! Cage objects have a method per call, in a typed form returning
//! `SysResult` and an `i32` form returning what the calling program sees.
//!

pub mod fs_calls;
pub mod fs_constants;
pub mod net_calls;
pub mod net_constants;
pub mod sys_calls;
pub mod sys_constants;
pub use fs_calls::*;
pub use fs_constants::*;
pub use net_calls::*;
pub use net_constants::*;
pub use sys_calls::*;
pub use sys_constants::*;
