//! This module holds the kernel side of safedesc: cages, their descriptor
//! tables, and the calls a hosted program makes against them.
//!
//! ## top-level features:
//!
//! - ### Dispatcher:
//!     - The dispatcher receives numbered call requests from a loader. It
//!       looks the cage up in the cage table, unpacks the raw arguments, and
//!       calls the method corresponding to the call number. A bad argument is
//!       recorded as the cage's errno and answered with `-1`.
//!
//! - ### Cage Objects:
//!     - Each cage object has a Cage ID, a Parent ID, a File Descriptor Table,
//!       the exit cells of its unjoined children, and its last errno.
//!
//! - ### File Descriptor Table:
//!     - A fixed row of slots, each behind its own lock. Descriptors are an
//!       Enum over the three kinds a handle can name (File, Stream, Socket).
//!       The lowest free slot is always the one handed out.
//!
//! - ### FS Metadata:
//!     - Maps names to file objects and file objects to their open counts.
//!       An unlinked object lives on until its last descriptor closes.
//!
//! - ### Net Metadata:
//!     - The connection endpoint used by connect and accept, along with the
//!       configured timeouts.

pub mod cage;
pub mod dispatcher;
pub mod filesystem;
pub mod net;
pub mod syscalls;
