// Error values for the kernel
//
// Errno mirrors the host errno numbering so values can be compared against
// libc in tests. SysError is the kernel's own failure taxonomy; every typed
// syscall returns one of these and the i32 boundary collapses it to -1.

use std::sync::atomic::{AtomicIsize, Ordering};

use thiserror::Error;

/// Verbosity handed to `kernelinit`, consulted by `syscall_error`.
pub static VERBOSE: AtomicIsize = AtomicIsize::new(0);

/// The boundary value every failing syscall returns.
pub const SYSCALL_ERROR: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    ESUCCESS = 0,
    EPERM = libc::EPERM,
    ENOENT = libc::ENOENT,
    ESRCH = libc::ESRCH,
    EINTR = libc::EINTR,
    EIO = libc::EIO,
    ENOEXEC = libc::ENOEXEC,
    EBADF = libc::EBADF,
    ECHILD = libc::ECHILD,
    EAGAIN = libc::EAGAIN,
    EINVAL = libc::EINVAL,
    EMFILE = libc::EMFILE,
    ENAMETOOLONG = libc::ENAMETOOLONG,
    EPIPE = libc::EPIPE,
    ENOTCONN = libc::ENOTCONN,
    ECONNRESET = libc::ECONNRESET,
    ECONNREFUSED = libc::ECONNREFUSED,
    EHOSTUNREACH = libc::EHOSTUNREACH,
    EADDRNOTAVAIL = libc::EADDRNOTAVAIL,
    ETIMEDOUT = libc::ETIMEDOUT,
}

impl Errno {
    pub fn from_discriminant(value: i32) -> Result<Errno, ()> {
        use Errno::*;
        const ALL: [Errno; 20] = [
            ESUCCESS,
            EPERM,
            ENOENT,
            ESRCH,
            EINTR,
            EIO,
            ENOEXEC,
            EBADF,
            ECHILD,
            EAGAIN,
            EINVAL,
            EMFILE,
            ENAMETOOLONG,
            EPIPE,
            ENOTCONN,
            ECONNRESET,
            ECONNREFUSED,
            EHOSTUNREACH,
            EADDRNOTAVAIL,
            ETIMEDOUT,
        ];
        ALL.iter()
            .copied()
            .find(|e| *e as i32 == value)
            .ok_or(())
    }
}

/// Failure kinds observed by descriptor, network and process calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SysError {
    #[error("descriptor table is full")]
    TableFull,
    #[error("invalid or closed descriptor")]
    InvalidHandle,
    #[error("no such file")]
    NotFound,
    #[error("object is closed")]
    Closed,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("host unreachable")]
    Unreachable,
    #[error("connection error")]
    ConnectionError,
    #[error("operation timed out")]
    Timeout,
    #[error("cannot listen on port")]
    ListenError,
    #[error("could not load program")]
    LoadError,
    #[error("not a joinable child")]
    InvalidPid,
    #[error("no data available yet, try again")]
    WouldBlock,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("operation not permitted")]
    NotPermitted,
    #[error("backing store failure: {0}")]
    Io(String),
}

impl SysError {
    pub fn errno(&self) -> Errno {
        match self {
            SysError::TableFull => Errno::EMFILE,
            SysError::InvalidHandle => Errno::EBADF,
            SysError::NotFound => Errno::ENOENT,
            SysError::Closed => Errno::EPIPE,
            SysError::ConnectionRefused => Errno::ECONNREFUSED,
            SysError::Unreachable => Errno::EHOSTUNREACH,
            SysError::ConnectionError => Errno::ECONNRESET,
            SysError::Timeout => Errno::ETIMEDOUT,
            SysError::ListenError => Errno::EADDRNOTAVAIL,
            SysError::LoadError => Errno::ENOEXEC,
            SysError::InvalidPid => Errno::ECHILD,
            SysError::WouldBlock => Errno::EAGAIN,
            SysError::InvalidArgument => Errno::EINVAL,
            SysError::NotPermitted => Errno::EPERM,
            SysError::Io(_) => Errno::EIO,
        }
    }

    /// A caller may simply retry the same call after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, SysError::WouldBlock)
    }
}

impl From<std::io::Error> for SysError {
    fn from(e: std::io::Error) -> Self {
        SysError::Io(e.to_string())
    }
}

pub type SysResult<T> = Result<T, SysError>;

pub fn syscall_error(e: SysError, syscall: &str, message: &str) -> i32 {
    if VERBOSE.load(Ordering::Relaxed) > 0 {
        log::debug!(target: "safedesc::syscall", "{} syscall error ({}): {}", syscall, e, message);
    } else {
        log::trace!(target: "safedesc::syscall", "{} syscall error ({}): {}", syscall, e, message);
    }
    SYSCALL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_match_host() {
        assert_eq!(Errno::EBADF as i32, libc::EBADF);
        assert_eq!(SysError::TableFull.errno() as i32, libc::EMFILE);
        assert_eq!(Errno::from_discriminant(libc::ENOENT), Ok(Errno::ENOENT));
        assert!(Errno::from_discriminant(-3).is_err());
    }

    #[test]
    fn only_wouldblock_is_transient() {
        assert!(SysError::WouldBlock.is_transient());
        assert!(!SysError::Timeout.is_transient());
        assert!(!SysError::ConnectionError.is_transient());
        assert_eq!(syscall_error(SysError::NotFound, "open", "no such file"), -1);
    }
}
