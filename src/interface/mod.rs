//! Module definitions for the safedesc interface
//!
//! ## Interface Module
//!
//! Every call the kernel makes into the host (locks, maps, files, threads,
//! clocks, logging) goes through this module. Libraries are imported only via
//! `use` statements within these files, so the surface the kernel depends on
//! stays small and can be audited in one place.

mod comm;
pub mod errnos;
mod file;
mod misc;
mod pipe;
mod timer;
pub mod types;
pub use comm::*;
pub use errnos::*;
pub use file::*;
pub use misc::*;
pub use pipe::*;
pub use timer::*;
pub use types::*;
