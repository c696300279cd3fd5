//! This module contains the descriptor-level file system calls.
//!
//! ## Notes:
//!
//! - These calls are implementations of the [`Cage`] struct in the
//!   [`safeposix`](crate::safeposix) module. Every call comes in two forms:
//!   a typed one returning [`SysResult`], and a `*_syscall` one returning the
//!   `i32` the calling program sees, where every failure is `-1`.
//!
//! ## File System Calls
//!
//! - [creat_syscall](crate::safeposix::cage::Cage::creat_syscall)
//! - [open_syscall](crate::safeposix::cage::Cage::open_syscall)
//! - [read_syscall](crate::safeposix::cage::Cage::read_syscall)
//! - [write_syscall](crate::safeposix::cage::Cage::write_syscall)
//! - [close_syscall](crate::safeposix::cage::Cage::close_syscall)
//! - [unlink_syscall](crate::safeposix::cage::Cage::unlink_syscall)

use crate::interface;
use crate::interface::{SysError, SysResult};
use crate::safeposix::cage::{FileDescriptor::*, *};
use crate::safeposix::filesystem::fs_metadata;

use super::fs_constants::*;

/// Bytes one read or write syscall may move, so the count it returns never
/// wraps negative.
pub fn transfer_len(count: usize) -> usize {
    count.min(MAX_TRANSFER)
}

impl Cage {
    /// ### Description
    ///
    /// Binds the lowest free handle to a fresh, empty file object named
    /// `path`. When the name is already bound, the existing object is
    /// truncated and shared instead.
    ///
    /// ### Errors
    ///
    /// * `TableFull` - no free handle; checked before the name is touched,
    ///   so a full table never creates or truncates anything.
    /// * `InvalidArgument` - empty name, or longer than `MAX_NAME_LENGTH`.
    pub fn creat(&self, path: &str) -> SysResult<i32> {
        let (fd, mut guard) = self.get_next_fd(None)?;
        let objid = fs_metadata().create_object(path)?;
        *guard = Some(File(FileDesc {
            position: 0,
            objid: objid,
        }));
        log::debug!(target: "safedesc::fs", "cage {} creat {} -> fd {}", self.cageid, path, fd);
        Ok(fd)
    }

    pub fn creat_syscall(&self, path: &str) -> i32 {
        self.syscall_return(self.creat(path), "creat")
    }

    /// ### Description
    ///
    /// Binds the lowest free handle to the object currently named `path`,
    /// with its own cursor at 0.
    ///
    /// ### Errors
    ///
    /// * `TableFull` - no free handle, whether or not the name exists.
    /// * `NotFound` - nothing is bound to `path`, including names unlinked
    ///   while still open elsewhere.
    pub fn open(&self, path: &str) -> SysResult<i32> {
        let (fd, mut guard) = self.get_next_fd(None)?;
        let objid = fs_metadata().open_object(path)?;
        *guard = Some(File(FileDesc {
            position: 0,
            objid: objid,
        }));
        log::debug!(target: "safedesc::fs", "cage {} open {} -> fd {}", self.cageid, path, fd);
        Ok(fd)
    }

    pub fn open_syscall(&self, path: &str) -> i32 {
        self.syscall_return(self.open(path), "open")
    }

    /// ### Description
    ///
    /// Reads up to `buf.len()` bytes.
    ///
    /// * Files read from the descriptor's cursor and advance it; 0 means the
    ///   cursor is at the end.
    /// * Console input (handle 0) reads from the host stdin.
    /// * Sockets wait for data. 0 means the peer shut down and everything it
    ///   sent has been read. With a read timeout configured, running out of
    ///   time gives `WouldBlock`, and the caller may simply retry.
    ///
    /// ### Errors
    ///
    /// * `InvalidHandle` - `fd` is not bound, or is console output.
    /// * `WouldBlock` - socket read timed out before any data arrived.
    /// * `ConnectionError` - the socket was torn down.
    /// * `Closed` - the file object behind `fd` no longer exists.
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> SysResult<usize> {
        let checkedfd = self.get_filedescriptor(fd)?;
        let mut unlocked_fd = checkedfd.write();

        let sockhandle = match &mut *unlocked_fd {
            // We must borrow the filedesc object as a mutable reference to update the position
            Some(File(ref mut normalfile_filedesc_obj)) => {
                let position = normalfile_filedesc_obj.position;
                let bytesread =
                    fs_metadata().readat(normalfile_filedesc_obj.objid, buf, position)?;
                //move position forward by the number of bytes we've read
                normalfile_filedesc_obj.position += bytesread;
                return Ok(bytesread);
            }
            Some(Stream(stream_filedesc_obj)) => {
                if stream_filedesc_obj.stream != STDIN_FILENO {
                    return Err(SysError::InvalidHandle);
                }
                None
            }
            Some(Socket(socket_filedesc_obj)) => Some(socket_filedesc_obj.handle.clone()),
            None => return Err(SysError::InvalidHandle),
        };

        // never hold the slot while parked on a socket or the host stdin
        drop(unlocked_fd);
        match sockhandle {
            Some(sockhandle) => self.recv_from_socket(&sockhandle, buf),
            None => Ok(interface::read_from_stdin(buf)?),
        }
    }

    pub fn read_syscall(&self, fd: i32, buf: *mut u8, count: usize) -> i32 {
        let result = if buf.is_null() {
            Err(SysError::InvalidArgument)
        } else {
            let slice = unsafe { std::slice::from_raw_parts_mut(buf, transfer_len(count)) };
            self.read(fd, slice).map(|n| n as i32)
        };
        self.syscall_return(result, "read")
    }

    /// ### Description
    ///
    /// Writes `buf`.
    ///
    /// * Files write at the descriptor's cursor, growing the object as
    ///   needed, and advance it. A file whose name was unlinked keeps
    ///   accepting writes until its last descriptor closes.
    /// * Console output (handle 1) goes to the host stdout.
    /// * Sockets queue bytes for the peer, possibly fewer than asked when the
    ///   peer is not keeping up.
    ///
    /// ### Errors
    ///
    /// * `InvalidHandle` - `fd` is not bound, or is console input.
    /// * `Closed` - the peer shut the connection down, or the file object
    ///   behind `fd` no longer exists.
    pub fn write(&self, fd: i32, buf: &[u8]) -> SysResult<usize> {
        let checkedfd = self.get_filedescriptor(fd)?;
        let mut unlocked_fd = checkedfd.write();

        let sockhandle = match &mut *unlocked_fd {
            Some(File(ref mut normalfile_filedesc_obj)) => {
                let position = normalfile_filedesc_obj.position;
                let byteswritten =
                    fs_metadata().writeat(normalfile_filedesc_obj.objid, buf, position)?;
                normalfile_filedesc_obj.position += byteswritten;
                return Ok(byteswritten);
            }
            Some(Stream(stream_filedesc_obj)) => {
                if stream_filedesc_obj.stream != STDOUT_FILENO {
                    return Err(SysError::InvalidHandle);
                }
                return Ok(interface::log_to_stdout(buf)?);
            }
            Some(Socket(socket_filedesc_obj)) => socket_filedesc_obj.handle.clone(),
            None => return Err(SysError::InvalidHandle),
        };

        drop(unlocked_fd);
        self.send_to_socket(&sockhandle, buf)
    }

    pub fn write_syscall(&self, fd: i32, buf: *const u8, count: usize) -> i32 {
        let result = if buf.is_null() {
            Err(SysError::InvalidArgument)
        } else {
            let slice = unsafe { std::slice::from_raw_parts(buf, transfer_len(count)) };
            self.write(fd, slice).map(|n| n as i32)
        };
        self.syscall_return(result, "write")
    }

    /// ### Description
    ///
    /// Unbinds `fd` and drops its reference. Closing console handles unbinds
    /// them for good; they are never handed out again.
    ///
    /// ### Errors
    ///
    /// * `InvalidHandle` - `fd` is not bound, including a second close.
    pub fn close(&self, fd: i32) -> SysResult<()> {
        let checkedfd = self.get_filedescriptor(fd)?;
        let taken = checkedfd.write().take();
        match taken {
            Some(filedesc_enum) => {
                log::trace!(target: "safedesc::fs", "cage {} close fd {}", self.cageid, fd);
                self._close_helper_inner(filedesc_enum)
            }
            None => Err(SysError::InvalidHandle),
        }
    }

    pub fn close_syscall(&self, fd: i32) -> i32 {
        self.syscall_return(self.close(fd).map(|_| 0), "close")
    }

    // Drops whatever reference an unbound descriptor held
    pub fn _close_helper_inner(&self, filedesc_enum: FileDescriptor) -> SysResult<()> {
        match filedesc_enum {
            //console streams have nothing behind them
            Stream(_) => Ok(()),
            // ending the connection wakes a reader parked on it, even one
            // holding its own reference to the handle
            Socket(socket_filedesc_obj) => {
                socket_filedesc_obj.handle.stream.shutdown();
                Ok(())
            }
            File(normalfile_filedesc_obj) => {
                fs_metadata().release_object(normalfile_filedesc_obj.objid)
            }
        }
    }

    /// ### Description
    ///
    /// Removes the name `path`. If no descriptor references the object it is
    /// deleted right away; otherwise it stays readable and writable through
    /// those descriptors and is deleted when the last one closes. The name is
    /// free for a new, unrelated object immediately.
    ///
    /// ### Errors
    ///
    /// * `NotFound` - nothing is bound to `path`.
    pub fn unlink(&self, path: &str) -> SysResult<()> {
        fs_metadata().unlink_object(path)?;
        log::debug!(target: "safedesc::fs", "cage {} unlink {}", self.cageid, path);
        Ok(())
    }

    pub fn unlink_syscall(&self, path: &str) -> i32 {
        self.syscall_return(self.unlink(path).map(|_| 0), "unlink")
    }
}
