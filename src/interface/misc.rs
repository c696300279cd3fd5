// Misc functions for interface
// Locks, maps, threads, console output, verbosity.

use std::io::{Read, Write};
use std::sync::atomic::Ordering;

pub use dashmap::{mapref::entry::Entry as RustHashEntry, DashMap as RustHashMap};
pub use parking_lot::{
    Condvar, Mutex, MutexGuard, RwLock as RustLock, RwLockWriteGuard as RustLockWriteGuard,
};
pub use std::collections::{BTreeMap as RustBTreeMap, VecDeque as RustDeque};
pub use std::sync::atomic::{
    AtomicBool as RustAtomicBool, AtomicI32 as RustAtomicI32, AtomicU64 as RustAtomicU64,
    AtomicUsize as RustAtomicUsize, Ordering as RustAtomicOrdering,
};
pub use std::sync::{Arc as RustRfc, LazyLock as RustLazyGlobal};
pub use std::thread::JoinHandle as RustJoinHandle;

pub use serde::{de::DeserializeOwned as SerdeDeserializeOwned, Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use super::errnos::VERBOSE;

pub fn serde_serialize_to_bytes<T: SerdeSerialize>(input: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(input)
}

pub fn serde_deserialize_from_bytes<T: SerdeDeserializeOwned>(input: &[u8]) -> Result<T, serde_cbor::Error> {
    serde_cbor::from_slice(input)
}

// Write program output to the host stdout
pub fn log_to_stdout(buf: &[u8]) -> std::io::Result<usize> {
    let mut out = std::io::stdout().lock();
    out.write_all(buf)?;
    Ok(buf.len())
}

// Read whatever the host stdin has ready, blocking until at least one byte or EOF
pub fn read_from_stdin(buf: &mut [u8]) -> std::io::Result<usize> {
    std::io::stdin().lock().read(buf)
}

pub fn helper_thread<F>(f: F) -> RustJoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::spawn(f)
}

pub fn new_hashmap<K: Eq + std::hash::Hash, V>() -> RustHashMap<K, V> {
    RustHashMap::new()
}

// 0 keeps warnings only, 1 turns on debug records, anything higher traces every call
pub fn set_verbosity(verbosity: isize) {
    VERBOSE.store(verbosity, Ordering::Relaxed);
    let level = match verbosity {
        v if v <= 0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    log::set_max_level(level);
}
