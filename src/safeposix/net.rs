use crate::interface;
use crate::interface::{ConnectionEndpoint, SysResult};

use super::syscalls::net_constants::*;

pub static NET_METADATA: interface::RustLazyGlobal<interface::RustLock<interface::RustRfc<NetMetadata>>> =
    interface::RustLazyGlobal::new(|| {
        interface::RustLock::new(interface::RustRfc::new(NetMetadata::new(
            Box::new(interface::LoopbackNetwork::new(DEFAULT_LINK, MAX_PORT, SOCKET_BUFFER_SIZE)),
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_ACCEPT_TIMEOUT,
            DEFAULT_READ_TIMEOUT,
        )))
    });

pub fn net_metadata() -> interface::RustRfc<NetMetadata> {
    NET_METADATA.read().clone()
}

#[derive(Debug)]
pub struct NetMetadata {
    pub endpoint: Box<dyn ConnectionEndpoint>,
    pub connect_timeout: interface::RustDuration,
    pub accept_timeout: Option<interface::RustDuration>,
    pub read_timeout: Option<interface::RustDuration>,
    live_sockets: interface::RustRfc<interface::RustAtomicUsize>,
}

impl NetMetadata {
    pub fn new(
        endpoint: Box<dyn ConnectionEndpoint>,
        connect_timeout: interface::RustDuration,
        accept_timeout: Option<interface::RustDuration>,
        read_timeout: Option<interface::RustDuration>,
    ) -> NetMetadata {
        NetMetadata {
            endpoint,
            connect_timeout,
            accept_timeout,
            read_timeout,
            live_sockets: interface::RustRfc::new(interface::RustAtomicUsize::new(0)),
        }
    }

    pub fn connect(&self, host: i32, port: i32) -> SysResult<SocketHandle> {
        let end = self.endpoint.connect(host, port, self.connect_timeout)?;
        Ok(SocketHandle::new(end, self.live_sockets.clone()))
    }

    pub fn accept(&self, port: i32) -> SysResult<SocketHandle> {
        let end = self.endpoint.accept(port, self.accept_timeout)?;
        Ok(SocketHandle::new(end, self.live_sockets.clone()))
    }

    /// Wakes every connect and accept still parked on this network.
    pub fn shutdown(&self) {
        self.endpoint.shutdown();
    }

    /// Socket handles not yet dropped.
    pub fn live_socket_count(&self) -> usize {
        self.live_sockets.load(interface::RustAtomicOrdering::SeqCst)
    }
}

//This structure contains all socket-associated data that is not held in the fd
#[derive(Debug)]
pub struct SocketHandle {
    pub stream: interface::StreamEnd,
    live: interface::RustRfc<interface::RustAtomicUsize>,
}

impl SocketHandle {
    fn new(stream: interface::StreamEnd, live: interface::RustRfc<interface::RustAtomicUsize>) -> SocketHandle {
        live.fetch_add(1, interface::RustAtomicOrdering::SeqCst);
        SocketHandle { stream, live }
    }

    pub fn state(&self) -> interface::ConnState {
        self.stream.state()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.stream.bytes_sent()
    }

    pub fn bytes_received(&self) -> u64 {
        self.stream.bytes_received()
    }
}

// A reader blocked on this socket holds its own reference, so the stream is
// shut down on close, not here. Dropping only settles the accounting.
impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, interface::RustAtomicOrdering::SeqCst);
        log::trace!(
            target: "safedesc::net",
            "socket {:?} -> {:?} dropped after {} bytes out, {} in",
            self.stream.local_addr(),
            self.stream.remote_addr(),
            self.stream.bytes_sent(),
            self.stream.bytes_received()
        );
    }
}
