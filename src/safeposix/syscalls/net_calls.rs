//! Network calls. A connected socket is a descriptor like any other: read,
//! write and close reach it through the same table as files.

use crate::interface;
use crate::interface::{SysError, SysResult};
use crate::safeposix::cage::{FileDescriptor::*, *};
use crate::safeposix::net::{net_metadata, SocketHandle};

impl Cage {
    /// ### Description
    ///
    /// Connects to `host:port` and binds the lowest free handle to the new
    /// socket.
    ///
    /// ### Errors
    ///
    /// * `TableFull` - no free handle; checked before any connection is made.
    /// * `ConnectionError` - the kernel shut down while waiting.
    /// * `Unreachable` - `host` is not the local link.
    /// * `ConnectionRefused` - nothing accepted on `port` within the connect
    ///   timeout.
    /// * `InvalidArgument` - `port` is outside the port range.
    pub fn connect(&self, host: i32, port: i32) -> SysResult<i32> {
        let (fd, guard) = self.get_next_fd(None)?;
        let handle = net_metadata().connect(host, port)?;
        Self::_insert_socket(guard, handle);
        log::debug!(target: "safedesc::net", "cage {} connected to {}:{} on fd {}", self.cageid, host, port, fd);
        Ok(fd)
    }

    pub fn connect_syscall(&self, host: i32, port: i32) -> i32 {
        self.syscall_return(self.connect(host, port), "connect")
    }

    /// ### Description
    ///
    /// Waits for a connection request on `port` and binds the lowest free
    /// handle to it. The same port may be accepted on again and again, each
    /// call giving an independent socket.
    ///
    /// ### Errors
    ///
    /// * `TableFull` - no free handle; checked before waiting.
    /// * `ListenError` - `port` is outside the port range.
    /// * `Timeout` - an accept timeout is configured and it passed.
    /// * `ConnectionError` - the kernel shut down while waiting.
    pub fn accept(&self, port: i32) -> SysResult<i32> {
        let (fd, guard) = self.get_next_fd(None)?;
        let handle = net_metadata().accept(port)?;
        Self::_insert_socket(guard, handle);
        log::debug!(target: "safedesc::net", "cage {} accepted on port {} as fd {}", self.cageid, port, fd);
        Ok(fd)
    }

    pub fn accept_syscall(&self, port: i32) -> i32 {
        self.syscall_return(self.accept(port), "accept")
    }

    // The slot is claimed before the network is touched and stays locked
    // until the socket lands in it. Allocation skips locked slots, and
    // teardown shuts the network down before draining, so a parked
    // connect or accept gives the slot back.
    fn _insert_socket(
        mut guard: interface::RustLockWriteGuard<'_, Option<FileDescriptor>>,
        handle: SocketHandle,
    ) {
        *guard = Some(Socket(SocketDesc {
            handle: interface::RustRfc::new(handle),
        }));
    }

    pub fn recv_from_socket(&self, sockhandle: &SocketHandle, buf: &mut [u8]) -> SysResult<usize> {
        let timeout = net_metadata().read_timeout;
        sockhandle.stream.recv(buf, timeout)
    }

    pub fn send_to_socket(&self, sockhandle: &SocketHandle, buf: &[u8]) -> SysResult<usize> {
        sockhandle.stream.send(buf, false)
    }

    /// Bytes sent and received so far on the socket bound to `fd`.
    pub fn socket_counters(&self, fd: i32) -> SysResult<(u64, u64)> {
        let checkedfd = self.get_filedescriptor(fd)?;
        let unlocked_fd = checkedfd.read();
        match &*unlocked_fd {
            Some(Socket(socket_filedesc_obj)) => Ok((
                socket_filedesc_obj.handle.bytes_sent(),
                socket_filedesc_obj.handle.bytes_received(),
            )),
            _ => Err(SysError::InvalidHandle),
        }
    }

    pub fn socket_state(&self, fd: i32) -> SysResult<interface::ConnState> {
        let checkedfd = self.get_filedescriptor(fd)?;
        let unlocked_fd = checkedfd.read();
        match &*unlocked_fd {
            Some(Socket(socket_filedesc_obj)) => Ok(socket_filedesc_obj.handle.state()),
            _ => Err(SysError::InvalidHandle),
        }
    }
}
