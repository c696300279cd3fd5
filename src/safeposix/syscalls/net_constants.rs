// Network related constants

use crate::interface;

// Define constants using static or const
// Imported into net_calls file

// the only link address the loopback network answers to
pub const DEFAULT_LINK: i32 = 0;

// valid ports are 0..MAX_PORT
pub const MAX_PORT: i32 = 128;

// bytes buffered in each direction of a connection
pub const SOCKET_BUFFER_SIZE: usize = 64 * 1024;

pub const DEFAULT_CONNECT_TIMEOUT: interface::RustDuration = interface::RustDuration::from_secs(5);
// None blocks until something happens
pub const DEFAULT_ACCEPT_TIMEOUT: Option<interface::RustDuration> = None;
pub const DEFAULT_READ_TIMEOUT: Option<interface::RustDuration> = None;
