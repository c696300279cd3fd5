// Syscall numbers, as a loaded program passes them
pub const HALT_SYSCALL: i32 = 0;
pub const EXIT_SYSCALL: i32 = 1;
pub const EXEC_SYSCALL: i32 = 2;
pub const JOIN_SYSCALL: i32 = 3;
pub const CREAT_SYSCALL: i32 = 4;
pub const OPEN_SYSCALL: i32 = 5;
pub const READ_SYSCALL: i32 = 6;
pub const WRITE_SYSCALL: i32 = 7;
pub const CLOSE_SYSCALL: i32 = 8;
pub const UNLINK_SYSCALL: i32 = 9;
pub const CONNECT_SYSCALL: i32 = 11;
pub const ACCEPT_SYSCALL: i32 = 12;

use crate::interface;
use crate::interface::errnos::*;
use crate::interface::Arg;

use super::cage::*;
use super::filesystem::{fs_metadata, FilesystemMetadata, FS_METADATA};
use super::net::{net_metadata, NetMetadata, NET_METADATA};
use super::syscalls::net_constants::*;
use super::syscalls::sys_calls::reset_cage_counters;
use super::syscalls::sys_constants::*;

//this macro takes in a syscall invocation name (i.e. cage.open_syscall), and all of the arguments
//to the syscall. Then it unwraps the arguments, recording and returning the error if any one of
//them is malformed, and returning the value of the function if not. It does this by using the ?
//operator in the body of a closure within the variadic macro
macro_rules! check_and_dispatch {
    ( $cage:ident . $func:ident $(, $arg:expr)* ) => {
        match (|| -> SysResult<i32> { Ok($cage.$func( $($arg?),* )) })() {
            Ok(i) => i,
            Err(e) => $cage.syscall_return(Err(e), stringify!($func)),
        }
    };
}

/// Where file data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    /// One host file per object under `dir`, plus the metadata file, so
    /// names survive a finalize and the next init.
    Host { dir: interface::RustPathBuf },
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub verbosity: isize,
    pub store: StoreConfig,
    pub link: i32,
    pub connect_timeout: interface::RustDuration,
    pub accept_timeout: Option<interface::RustDuration>,
    pub read_timeout: Option<interface::RustDuration>,
    pub socket_buffer_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            verbosity: 0,
            store: StoreConfig::Memory,
            link: DEFAULT_LINK,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            socket_buffer_size: SOCKET_BUFFER_SIZE,
        }
    }
}

// exit unwinds the calling program's thread up to its cage boundary, so the
// entry point must let that unwind pass through
#[no_mangle]
pub extern "C-unwind" fn dispatcher(
    cageid: u64,
    callnum: i32,
    arg1: Arg,
    arg2: Arg,
    arg3: Arg,
) -> i32 {
    // need to match based on if cage exists
    let cage = match cagetable_getref(cageid) {
        Some(cage) => cage,
        None => {
            return syscall_error(
                SysError::InvalidArgument,
                "dispatcher",
                "no cage with that id",
            )
        }
    };

    match callnum {
        HALT_SYSCALL => check_and_dispatch!(cage.halt_syscall),
        EXIT_SYSCALL => match interface::get_int(arg1) {
            Ok(status) => cage.exit_syscall(status),
            Err(e) => cage.syscall_return(Err(e), "exit"),
        },
        EXEC_SYSCALL => match exec_args(arg1, arg2, arg3) {
            Ok((program, argv)) => cage.exec_syscall(program, &argv),
            Err(e) => cage.syscall_return(Err(e), "exec"),
        },
        JOIN_SYSCALL => {
            check_and_dispatch!(cage.join_syscall, interface::get_int(arg1), interface::get_intptr(arg2))
        }
        CREAT_SYSCALL => check_and_dispatch!(cage.creat_syscall, interface::get_cstr(arg1)),
        OPEN_SYSCALL => check_and_dispatch!(cage.open_syscall, interface::get_cstr(arg1)),
        READ_SYSCALL => check_and_dispatch!(
            cage.read_syscall,
            interface::get_int(arg1),
            interface::get_mutcbuf(arg2),
            interface::get_usize(arg3)
        ),
        WRITE_SYSCALL => check_and_dispatch!(
            cage.write_syscall,
            interface::get_int(arg1),
            interface::get_cbuf(arg2),
            interface::get_usize(arg3)
        ),
        CLOSE_SYSCALL => check_and_dispatch!(cage.close_syscall, interface::get_int(arg1)),
        UNLINK_SYSCALL => check_and_dispatch!(cage.unlink_syscall, interface::get_cstr(arg1)),
        CONNECT_SYSCALL => check_and_dispatch!(
            cage.connect_syscall,
            interface::get_int(arg1),
            interface::get_int(arg2)
        ),
        ACCEPT_SYSCALL => check_and_dispatch!(cage.accept_syscall, interface::get_int(arg1)),
        _ => cage.syscall_return(Err(SysError::InvalidArgument), "dispatcher"),
    }
}

// exec passes the program name, argc, and a NULL terminated argv
fn exec_args<'a>(arg1: Arg, arg2: Arg, arg3: Arg) -> SysResult<(&'a str, Vec<&'a str>)> {
    let program = interface::get_cstr(arg1)?;
    let argc = interface::get_int(arg2)?;
    let mut argv = interface::get_cstrarr(arg3)?;
    if argc < 0 || argc as usize > argv.len() {
        return Err(SysError::InvalidArgument);
    }
    argv.truncate(argc as usize);
    Ok((program, argv))
}

/// Brings the kernel up with the in-memory store and default settings.
#[no_mangle]
pub extern "C" fn kernelinit(verbosity: isize) {
    let config = KernelConfig {
        verbosity: verbosity,
        ..KernelConfig::default()
    };
    if let Err(e) = kernelinit_with(config) {
        log::warn!(target: "safedesc::sys", "kernel init failed: {}", e);
    }
}

/// Brings the kernel up: file system (restored from the store if it holds
/// metadata), network, and the init cage. Anything left from an earlier run
/// that was never finalized is discarded.
pub fn kernelinit_with(config: KernelConfig) -> SysResult<()> {
    interface::set_verbosity(config.verbosity);
    discard_cages();

    let store: Box<dyn interface::BackingStore> = match &config.store {
        StoreConfig::Memory => Box::new(interface::MemStore::new()),
        StoreConfig::Host { dir } => Box::new(interface::HostStore::new(dir)?),
    };
    let metadata = FilesystemMetadata::load_fs(store)?;
    *FS_METADATA.write() = interface::RustRfc::new(metadata);

    let network = interface::LoopbackNetwork::new(config.link, MAX_PORT, config.socket_buffer_size);
    *NET_METADATA.write() = interface::RustRfc::new(NetMetadata::new(
        Box::new(network),
        config.connect_timeout,
        config.accept_timeout,
        config.read_timeout,
    ));

    //init cage is its own parent
    let initcage = Cage::new(INIT_CAGEID, INIT_CAGEID, vec![]);
    cagetable_insert(INIT_CAGEID, interface::RustRfc::new(initcage));
    reset_cage_counters(1);

    log::info!(target: "safedesc::sys", "kernel up, store {:?}", config.store);
    Ok(())
}

/// Shuts the network down, releases every descriptor of every cage, then
/// syncs and persists the file system metadata.
#[no_mangle]
pub extern "C" fn kernelfinalize() {
    discard_cages();

    let metadata = fs_metadata();
    if let Err(e) = metadata.sync_all().and_then(|_| metadata.persist_metadata()) {
        log::warn!(target: "safedesc::sys", "could not persist metadata: {}", e);
    }
    log::info!(target: "safedesc::sys", "kernel down");
}

fn discard_cages() {
    // a parked connect or accept holds its claimed slot until woken
    net_metadata().shutdown();
    // collected first so no table shard is held while descriptors close
    let cages: Vec<interface::RustRfc<Cage>> =
        CAGE_TABLE.iter().map(|entry| entry.value().clone()).collect();
    CAGE_TABLE.clear();
    for cage in cages {
        cage.drain_fdtable();
    }
    reset_cage_counters(0);
}
