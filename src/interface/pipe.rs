//! In-Memory Pipe Implementation for the safedesc interface
//!
//! ## Pipe Module
//!
//! A bounded single-direction byte channel. Two of these, crossed, make up
//! the duplex stream behind every socket descriptor. Readers and writers
//! park on condition variables instead of spinning, and a writer or reader
//! leaving wakes the other side so it can observe end of stream.

use crate::interface::errnos::{SysError, SysResult};
use crate::interface::timer::{RustDuration, RustInstant};

use parking_lot::{Condvar, Mutex};
use ringbuf::{Consumer, Producer, RingBuffer};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// # Description
/// Helper function to create pipe objects
///
/// # Arguments
///
/// * `size` - Capacity of the channel in bytes
///
/// # Returns
///
/// EmulatedPipe object
///
pub fn new_pipe(size: usize) -> EmulatedPipe {
    EmulatedPipe::new_with_capacity(size)
}

struct RingEnds {
    write_end: Producer<u8>,
    read_end: Consumer<u8>,
}

/// # Description
/// In-memory pipe struct
///
/// # Fields
///
/// * `ends` - Both halves of the ring buffer behind one lock, so a waiter
///   can sleep on it.
/// * `readable` - Signalled when bytes arrive or the last writer leaves.
/// * `writable` - Signalled when bytes are consumed or the last reader leaves.
/// * `refcount_write` - Count of open write references.
/// * `refcount_read` - Count of open read references.
/// * `eof` - Flag signifying the pipe has finished being written to.
/// * `size` - Size of pipe buffer in bytes.
#[derive(Clone)]
pub struct EmulatedPipe {
    ends: Arc<Mutex<RingEnds>>,
    readable: Arc<Condvar>,
    writable: Arc<Condvar>,
    refcount_write: Arc<AtomicU32>,
    refcount_read: Arc<AtomicU32>,
    eof: Arc<AtomicBool>,
    size: usize,
}

impl EmulatedPipe {
    pub fn new_with_capacity(size: usize) -> EmulatedPipe {
        let rb = RingBuffer::<u8>::new(size);
        let (prod, cons) = rb.split();
        EmulatedPipe {
            ends: Arc::new(Mutex::new(RingEnds {
                write_end: prod,
                read_end: cons,
            })),
            readable: Arc::new(Condvar::new()),
            writable: Arc::new(Condvar::new()),
            refcount_write: Arc::new(AtomicU32::new(1)),
            refcount_read: Arc::new(AtomicU32::new(1)),
            eof: Arc::new(AtomicBool::new(false)),
            size: size,
        }
    }

    pub fn get_read_ref(&self) -> u32 {
        self.refcount_read.load(Ordering::SeqCst)
    }

    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    /// # Description
    /// Drops one write reference. The last one marks end of stream and wakes
    /// every parked reader.
    pub fn close_write(&self) {
        let ends = self.ends.lock();
        if self.refcount_write.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.eof.store(true, Ordering::SeqCst);
        }
        drop(ends);
        self.readable.notify_all();
    }

    /// # Description
    /// Drops one read reference. Once none are left, writers fail instead of
    /// filling a buffer nobody drains.
    pub fn close_read(&self) {
        let ends = self.ends.lock();
        self.refcount_read.fetch_sub(1, Ordering::SeqCst);
        drop(ends);
        self.writable.notify_all();
        self.readable.notify_all();
    }

    /// ### Description
    ///
    /// write_to_pipe copies as much of `buf` as currently fits into the ring
    /// buffer. When there is no room at all it waits for a reader to make
    /// some, unless the call is nonblocking.
    ///
    /// ### Returns
    ///
    /// The number of bytes accepted, which may be less than `buf.len()`.
    ///
    /// ### Errors
    ///
    /// * `WouldBlock` - Non-blocking is enabled and the buffer is full.
    /// * `Closed` - Every read reference has been dropped.
    pub fn write_to_pipe(&self, buf: &[u8], nonblocking: bool) -> SysResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut ends = self.ends.lock();
        loop {
            if self.get_read_ref() == 0 {
                return Err(SysError::Closed);
            }

            if ends.write_end.remaining() > 0 {
                let written = ends.write_end.push_slice(buf);
                drop(ends);
                self.readable.notify_all();
                return Ok(written);
            }

            if nonblocking {
                return Err(SysError::WouldBlock);
            }
            self.writable.wait(&mut ends);
        }
    }

    /// ### Description
    ///
    /// read_from_pipe waits until at least one byte is buffered or the write
    /// side is gone, then copies out up to `buf.len()` bytes.
    ///
    /// ### Arguments
    ///
    /// * `buf` - destination
    /// * `timeout` - how long to wait for data; `None` waits indefinitely and
    ///   a zero duration never waits
    ///
    /// ### Returns
    ///
    /// The number of bytes read, or 0 at end of stream.
    ///
    /// ### Errors
    ///
    /// * `WouldBlock` - The timeout passed with nothing to read and the
    ///   writer still attached.
    /// * `ConnectionError` - The read side was closed while waiting.
    pub fn read_from_pipe(
        &self,
        buf: &mut [u8],
        timeout: Option<RustDuration>,
    ) -> SysResult<usize> {
        let deadline = timeout.map(|t| RustInstant::now() + t);
        let mut ends = self.ends.lock();

        while ends.read_end.is_empty() {
            if self.get_read_ref() == 0 {
                return Err(SysError::ConnectionError);
            }
            if self.is_eof() {
                return Ok(0);
            }
            match deadline {
                None => self.readable.wait(&mut ends),
                Some(deadline) => {
                    if RustInstant::now() >= deadline {
                        return Err(SysError::WouldBlock);
                    }
                    self.readable.wait_until(&mut ends, deadline);
                }
            }
        }

        let count = ends.read_end.pop_slice(buf);
        drop(ends);
        self.writable.notify_all();
        Ok(count)
    }
}

impl fmt::Debug for EmulatedPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedPipe")
            .field("refcount read", &self.refcount_read)
            .field("refcount write", &self.refcount_write)
            .field("eof", &self.eof)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pipe_preserves_order() {
        let pipe = new_pipe(16);
        assert_eq!(pipe.write_to_pipe(b"hello ", false).unwrap(), 6);
        assert_eq!(pipe.write_to_pipe(b"world", false).unwrap(), 5);
        let mut buf = [0u8; 32];
        let n = pipe.read_from_pipe(&mut buf, None).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test]
    fn pipe_write_is_partial_when_full() {
        let pipe = new_pipe(4);
        assert_eq!(pipe.write_to_pipe(b"abcdef", false).unwrap(), 4);
        assert_eq!(pipe.write_to_pipe(b"g", true), Err(SysError::WouldBlock));
    }

    #[test]
    fn pipe_empty_read_times_out_then_sees_eof() {
        let pipe = new_pipe(8);
        let mut buf = [0u8; 8];
        assert_eq!(
            pipe.read_from_pipe(&mut buf, Some(RustDuration::ZERO)),
            Err(SysError::WouldBlock)
        );
        pipe.close_write();
        assert_eq!(pipe.read_from_pipe(&mut buf, None), Ok(0));
    }

    #[test]
    fn pipe_write_without_reader_is_closed() {
        let pipe = new_pipe(8);
        pipe.close_read();
        assert_eq!(pipe.write_to_pipe(b"x", false), Err(SysError::Closed));
    }

    #[test]
    fn pipe_blocked_reader_wakes_on_write() {
        let pipe = new_pipe(8);
        let reader = pipe.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let n = reader.read_from_pipe(&mut buf, None).unwrap();
            buf[..n].to_vec()
        });
        thread::sleep(RustDuration::from_millis(20));
        pipe.write_to_pipe(b"ping", false).unwrap();
        assert_eq!(handle.join().unwrap(), b"ping".to_vec());
    }

    #[test]
    fn pipe_blocked_writer_wakes_on_read() {
        let pipe = new_pipe(2);
        assert_eq!(pipe.write_to_pipe(b"ab", false).unwrap(), 2);
        let writer = pipe.clone();
        let handle = thread::spawn(move || writer.write_to_pipe(b"cd", false));
        thread::sleep(RustDuration::from_millis(20));
        let mut buf = [0u8; 2];
        assert_eq!(pipe.read_from_pipe(&mut buf, None).unwrap(), 2);
        assert_eq!(handle.join().unwrap(), Ok(2));
        assert_eq!(pipe.read_from_pipe(&mut buf, None).unwrap(), 2);
        assert_eq!(&buf, b"cd");
    }
}
