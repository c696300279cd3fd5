// Connection endpoints. A connection is a pair of crossed in-memory pipes;
// the network below only decides who gets paired with whom.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::interface::errnos::{SysError, SysResult};
use crate::interface::pipe::{new_pipe, EmulatedPipe};
use crate::interface::timer::{RustDuration, RustInstant};
use crate::interface::RustDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    Established,
    StpSent,
    StpRcvd,
    Closing,
}

/// Address of one side of a connection: link address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockAddr {
    pub host: i32,
    pub port: i32,
}

/// One side of an established connection.
pub struct StreamEnd {
    inbound: EmulatedPipe,
    outbound: EmulatedPipe,
    state: Mutex<ConnState>,
    shut: AtomicBool,
    local: SockAddr,
    remote: SockAddr,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// Builds both sides of a connection. The first element belongs to the
/// side that initiated it.
pub fn endpoint_pair(client: SockAddr, server: SockAddr, size: usize) -> (StreamEnd, StreamEnd) {
    let upstream = new_pipe(size);
    let downstream = new_pipe(size);
    let clientend = StreamEnd::new(downstream.clone(), upstream.clone(), client, server);
    let serverend = StreamEnd::new(upstream, downstream, server, client);
    (clientend, serverend)
}

impl StreamEnd {
    fn new(inbound: EmulatedPipe, outbound: EmulatedPipe, local: SockAddr, remote: SockAddr) -> Self {
        StreamEnd {
            inbound,
            outbound,
            state: Mutex::new(ConnState::Established),
            shut: AtomicBool::new(false),
            local,
            remote,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    pub fn local_addr(&self) -> SockAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SockAddr {
        self.remote
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Queues bytes for the peer; the count may be short under backpressure.
    pub fn send(&self, buf: &[u8], nonblocking: bool) -> SysResult<usize> {
        if self.shut.load(Ordering::SeqCst) {
            return Err(SysError::Closed);
        }
        let result = self.outbound.write_to_pipe(buf, nonblocking);
        match result {
            Ok(n) => {
                self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(SysError::Closed) => {
                // peer went away underneath us
                let mut state = self.state.lock();
                if *state == ConnState::Established {
                    *state = ConnState::StpRcvd;
                }
            }
            Err(_) => {}
        }
        result
    }

    /// Ok(0) once the peer has shut down and everything it sent is consumed.
    pub fn recv(&self, buf: &mut [u8], timeout: Option<RustDuration>) -> SysResult<usize> {
        if self.shut.load(Ordering::SeqCst) {
            return Err(SysError::ConnectionError);
        }
        let n = self.inbound.read_from_pipe(buf, timeout)?;
        if n == 0 && !buf.is_empty() {
            let mut state = self.state.lock();
            if *state == ConnState::Established {
                *state = ConnState::StpRcvd;
            }
        }
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// Tears this side down. The peer reads end of stream once it drains
    /// what was already sent, and its writes start failing.
    pub fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state.lock();
            *state = match *state {
                ConnState::StpRcvd => ConnState::Closing,
                _ => ConnState::StpSent,
            };
        }
        self.outbound.close_write();
        self.inbound.close_read();
        *self.state.lock() = ConnState::Closed;
    }
}

impl Drop for StreamEnd {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEnd")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}

/// The network layer beneath connect and accept.
pub trait ConnectionEndpoint: Send + Sync + fmt::Debug {
    /// Waits up to `timeout` for an acceptor on `host:port`.
    fn connect(&self, host: i32, port: i32, timeout: RustDuration) -> SysResult<StreamEnd>;
    /// Waits for a connection request on `port`; `None` waits indefinitely.
    fn accept(&self, port: i32, timeout: Option<RustDuration>) -> SysResult<StreamEnd>;
    /// Fails every parked and later connect or accept with `ConnectionError`.
    fn shutdown(&self);
}

enum RequestState {
    Waiting,
    Accepted(StreamEnd),
    Withdrawn,
}

struct ConnRequest {
    from: SockAddr,
    state: Mutex<RequestState>,
    answered: Condvar,
}

/// A single local link. Connect requests queue per port until an acceptor
/// takes them, so either side may arrive first.
pub struct LoopbackNetwork {
    link: i32,
    maxport: i32,
    buffer_size: usize,
    queues: Mutex<Vec<RustDeque<Arc<ConnRequest>>>>,
    arrivals: Condvar,
    next_ephemeral: Mutex<i32>,
    down: AtomicBool,
}

impl LoopbackNetwork {
    pub fn new(link: i32, maxport: i32, buffer_size: usize) -> LoopbackNetwork {
        let ports = maxport.max(0) as usize;
        LoopbackNetwork {
            link,
            maxport,
            buffer_size,
            queues: Mutex::new((0..ports).map(|_| RustDeque::new()).collect()),
            arrivals: Condvar::new(),
            next_ephemeral: Mutex::new(0),
            down: AtomicBool::new(false),
        }
    }

    fn port_in_range(&self, port: i32) -> bool {
        port >= 0 && port < self.maxport
    }

    // Client side ports only label the connection, they are never listened on
    fn ephemeral_port(&self) -> i32 {
        let mut next = self.next_ephemeral.lock();
        let port = *next;
        *next = (*next + 1) % self.maxport.max(1);
        port
    }

    /// Requests still waiting for an acceptor on `port`.
    pub fn pending(&self, port: i32) -> usize {
        if !self.port_in_range(port) {
            return 0;
        }
        self.queues.lock()[port as usize].len()
    }
}

impl fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("link", &self.link)
            .field("maxport", &self.maxport)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl ConnectionEndpoint for LoopbackNetwork {
    fn connect(&self, host: i32, port: i32, timeout: RustDuration) -> SysResult<StreamEnd> {
        if host != self.link {
            return Err(SysError::Unreachable);
        }
        if !self.port_in_range(port) {
            return Err(SysError::InvalidArgument);
        }

        let request = Arc::new(ConnRequest {
            from: SockAddr {
                host: self.link,
                port: self.ephemeral_port(),
            },
            state: Mutex::new(RequestState::Waiting),
            answered: Condvar::new(),
        });
        {
            let mut queues = self.queues.lock();
            if self.down.load(Ordering::SeqCst) {
                return Err(SysError::ConnectionError);
            }
            queues[port as usize].push_back(request.clone());
        }
        self.arrivals.notify_all();
        log::trace!(target: "safedesc::net", "connect request queued on port {}", port);

        let deadline = RustInstant::now() + timeout;
        let mut state = request.state.lock();
        loop {
            match std::mem::replace(&mut *state, RequestState::Withdrawn) {
                RequestState::Accepted(end) => return Ok(end),
                // only shutdown withdraws a request it did not make
                RequestState::Withdrawn => return Err(SysError::ConnectionError),
                RequestState::Waiting => *state = RequestState::Waiting,
            }
            if RustInstant::now() >= deadline {
                *state = RequestState::Withdrawn;
                drop(state);
                self.queues.lock()[port as usize].retain(|r| !Arc::ptr_eq(r, &request));
                return Err(SysError::ConnectionRefused);
            }
            request.answered.wait_until(&mut state, deadline);
        }
    }

    fn accept(&self, port: i32, timeout: Option<RustDuration>) -> SysResult<StreamEnd> {
        if !self.port_in_range(port) {
            return Err(SysError::ListenError);
        }
        let deadline = timeout.map(|t| RustInstant::now() + t);
        let local = SockAddr {
            host: self.link,
            port,
        };

        let mut queues = self.queues.lock();
        loop {
            if self.down.load(Ordering::SeqCst) {
                return Err(SysError::ConnectionError);
            }
            while let Some(request) = queues[port as usize].pop_front() {
                let mut state = request.state.lock();
                if let RequestState::Waiting = *state {
                    let (clientend, serverend) =
                        endpoint_pair(request.from, local, self.buffer_size);
                    *state = RequestState::Accepted(clientend);
                    drop(state);
                    request.answered.notify_all();
                    log::trace!(target: "safedesc::net", "accepted connection on port {}", port);
                    return Ok(serverend);
                }
                // the connector gave up already
            }

            match deadline {
                None => self.arrivals.wait(&mut queues),
                Some(deadline) => {
                    if RustInstant::now() >= deadline {
                        return Err(SysError::Timeout);
                    }
                    self.arrivals.wait_until(&mut queues, deadline);
                }
            }
        }
    }

    fn shutdown(&self) {
        let mut queues = self.queues.lock();
        self.down.store(true, Ordering::SeqCst);
        for queue in queues.iter_mut() {
            for request in queue.drain(..) {
                *request.state.lock() = RequestState::Withdrawn;
                request.answered.notify_all();
            }
        }
        drop(queues);
        self.arrivals.notify_all();
        log::debug!(target: "safedesc::net", "link {} shut down", self.link);
    }
}
