// Timer functions for Rust interface.

use std::thread;
pub use std::time::{Duration as RustDuration, Instant as RustInstant};

pub fn sleep(dur: RustDuration) {
    thread::sleep(dur);
}
