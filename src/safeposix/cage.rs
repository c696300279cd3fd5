use crate::interface;
use crate::interface::{SysError, SysResult};

use super::net::SocketHandle;
use super::syscalls::fs_constants::*;

pub static CAGE_TABLE: interface::RustLazyGlobal<interface::RustHashMap<u64, interface::RustRfc<Cage>>> =
    interface::RustLazyGlobal::new(interface::new_hashmap);

// the parent link of a cage whose parent has exited
pub const ORPHANED: u64 = u64::MAX;

pub fn cagetable_getref(cageid: u64) -> Option<interface::RustRfc<Cage>> {
    CAGE_TABLE.get(&cageid).map(|cage| cage.clone())
}

pub fn cagetable_insert(cageid: u64, cage: interface::RustRfc<Cage>) {
    CAGE_TABLE.insert(cageid, cage);
}

pub fn cagetable_remove(cageid: u64) -> Option<interface::RustRfc<Cage>> {
    CAGE_TABLE.remove(&cageid).map(|(_, cage)| cage)
}

#[derive(Debug)]
pub enum FileDescriptor {
    File(FileDesc),
    Stream(StreamDesc),
    Socket(SocketDesc),
}

#[derive(Debug, Clone, Copy)]
pub struct FileDesc {
    pub position: usize,
    pub objid: usize,
}

// stream 0 is console input, 1 console output
#[derive(Debug, Clone, Copy)]
pub struct StreamDesc {
    pub stream: i32,
}

#[derive(Debug, Clone)]
pub struct SocketDesc {
    pub handle: interface::RustRfc<SocketHandle>,
}

pub type FdTable = Vec<interface::RustRfc<interface::RustLock<Option<FileDescriptor>>>>;

pub fn init_fdtable() -> FdTable {
    let fdtable: FdTable = (0..MAXOPENFILES)
        .map(|_| interface::RustRfc::new(interface::RustLock::new(None)))
        .collect();
    *fdtable[STDIN_FILENO as usize].write() = Some(FileDescriptor::Stream(StreamDesc {
        stream: STDIN_FILENO,
    }));
    *fdtable[STDOUT_FILENO as usize].write() = Some(FileDescriptor::Stream(StreamDesc {
        stream: STDOUT_FILENO,
    }));
    fdtable
}

/// How a cage ended, as seen by the cage that joins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    /// The program panicked instead of exiting.
    Abnormal,
}

/// Written once when a cage terminates; its parent's join waits on it.
#[derive(Debug, Default)]
pub struct ExitCell {
    status: interface::Mutex<Option<ExitStatus>>,
    posted: interface::Condvar,
}

impl ExitCell {
    pub fn new() -> ExitCell {
        ExitCell::default()
    }

    /// First post wins; returns whether this one did.
    pub fn post(&self, status: ExitStatus) -> bool {
        let mut slot = self.status.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(status);
        drop(slot);
        self.posted.notify_all();
        true
    }

    pub fn wait(&self) -> ExitStatus {
        let mut slot = self.status.lock();
        loop {
            if let Some(status) = *slot {
                return status;
            }
            self.posted.wait(&mut slot);
        }
    }
}

/// Unwinds a program's thread out of `exit`; the loader recognizes it.
#[derive(Debug)]
pub struct ProcessExit(pub i32);

#[derive(Debug)]
pub struct Cage {
    pub cageid: u64,
    pub parent: interface::RustAtomicU64,
    pub filedescriptortable: FdTable,
    pub children: interface::RustHashMap<u64, interface::RustRfc<ExitCell>>,
    pub exitcell: interface::RustRfc<ExitCell>,
    pub errno: interface::RustAtomicI32,
    pub argv: Vec<String>,
}

impl Cage {
    pub fn new(cageid: u64, parent: u64, argv: Vec<String>) -> Cage {
        Cage {
            cageid: cageid,
            parent: interface::RustAtomicU64::new(parent),
            filedescriptortable: init_fdtable(),
            children: interface::new_hashmap(),
            exitcell: interface::RustRfc::new(ExitCell::new()),
            errno: interface::RustAtomicI32::new(0),
            argv: argv,
        }
    }

    pub fn get_parent(&self) -> Option<u64> {
        match self.parent.load(interface::RustAtomicOrdering::SeqCst) {
            ORPHANED => None,
            parent => Some(parent),
        }
    }

    /// Claims the lowest free handle at or above `startfd`. The slot stays
    /// write locked in the returned guard until the caller fills it.
    pub fn get_next_fd(
        &self,
        startfd: Option<i32>,
    ) -> SysResult<(i32, interface::RustLockWriteGuard<'_, Option<FileDescriptor>>)> {
        let start = startfd.unwrap_or(STARTINGFD).max(STARTINGFD);
        for fd in start..MAXOPENFILES {
            // a slot someone else holds locked is in use
            if let Some(guard) = self.filedescriptortable[fd as usize].try_write() {
                if guard.is_none() {
                    return Ok((fd, guard));
                }
            }
        }
        Err(SysError::TableFull)
    }

    pub fn get_filedescriptor(
        &self,
        fd: i32,
    ) -> SysResult<interface::RustRfc<interface::RustLock<Option<FileDescriptor>>>> {
        if fd < 0 || fd >= MAXOPENFILES {
            return Err(SysError::InvalidHandle);
        }
        Ok(self.filedescriptortable[fd as usize].clone())
    }

    /// Handles currently bound, consoles included.
    pub fn open_fds(&self) -> Vec<i32> {
        (0..MAXOPENFILES)
            .filter(|fd| self.filedescriptortable[*fd as usize].read().is_some())
            .collect()
    }

    /// Releases every descriptor, as termination does.
    pub fn drain_fdtable(&self) {
        for fd in 0..MAXOPENFILES {
            let taken = self.filedescriptortable[fd as usize].write().take();
            if let Some(desc) = taken {
                if let Err(e) = self._close_helper_inner(desc) {
                    log::warn!(target: "safedesc::sys", "cage {} fd {} release failed: {}", self.cageid, fd, e);
                }
            }
        }
    }

    /// Records `result` as this cage's last outcome and collapses it to the
    /// i32 boundary value.
    pub fn syscall_return(&self, result: SysResult<i32>, syscall: &str) -> i32 {
        match result {
            Ok(retval) => retval,
            Err(e) => {
                self.errno
                    .store(e.errno() as i32, interface::RustAtomicOrdering::SeqCst);
                interface::syscall_error(e, syscall, &format!("cage {}", self.cageid))
            }
        }
    }

    /// The failure kind behind the most recent -1 from a `*_syscall` method.
    pub fn last_errno(&self) -> interface::Errno {
        let value = self.errno.load(interface::RustAtomicOrdering::SeqCst);
        interface::Errno::from_discriminant(value).unwrap_or(interface::Errno::ESUCCESS)
    }
}
