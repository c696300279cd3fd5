// System related system calls
//
// Cages run registered programs on their own host threads. A cage that
// finishes, calls exit, or panics is torn down the same way: its table is
// drained, its children are orphaned, and its exit status is posted for the
// parent to join.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use crate::interface;
use crate::interface::{SysError, SysResult};
use crate::safeposix::cage::*;
use crate::safeposix::filesystem::check_name;

use super::sys_constants::*;

/// A program a cage can exec: the cage it runs in and its argv.
pub type ProgramEntry = fn(&Cage, &[String]) -> i32;

pub static PROGRAM_TABLE: interface::RustLazyGlobal<interface::RustHashMap<String, ProgramEntry>> =
    interface::RustLazyGlobal::new(interface::new_hashmap);

static NEXT_CAGEID: interface::RustAtomicU64 = interface::RustAtomicU64::new(INIT_CAGEID + 1);
static LIVE_CAGES: interface::RustAtomicUsize = interface::RustAtomicUsize::new(0);

pub fn register_program(name: &str, entry: ProgramEntry) {
    PROGRAM_TABLE.insert(name.to_string(), entry);
}

pub fn unregister_program(name: &str) -> bool {
    PROGRAM_TABLE.remove(name).is_some()
}

pub fn live_cages() -> usize {
    LIVE_CAGES.load(interface::RustAtomicOrdering::SeqCst)
}

// Only kernelinit and kernelfinalize set this. Cage ids keep counting
// across runs so a straggler from an old run never matches a new cage.
pub fn reset_cage_counters(live: usize) {
    LIVE_CAGES.store(live, interface::RustAtomicOrdering::SeqCst);
}

fn reserve_cage_slot() -> SysResult<()> {
    LIVE_CAGES
        .fetch_update(
            interface::RustAtomicOrdering::SeqCst,
            interface::RustAtomicOrdering::SeqCst,
            |live| if live < MAX_CAGES { Some(live + 1) } else { None },
        )
        .map(|_| ())
        .map_err(|_| SysError::TableFull)
}

fn run_program(cage: interface::RustRfc<Cage>, entry: ProgramEntry) {
    let outcome = catch_unwind(AssertUnwindSafe(|| entry(&cage, &cage.argv)));
    match outcome {
        Ok(status) => cage.terminate(ExitStatus::Exited(status)),
        Err(payload) => {
            // exit already tore the cage down before unwinding
            if payload.downcast_ref::<ProcessExit>().is_none() {
                log::warn!(target: "safedesc::sys", "cage {} terminated abnormally", cage.cageid);
                cage.terminate(ExitStatus::Abnormal);
            }
        }
    }
}

impl Cage {
    /// ### Description
    ///
    /// Starts `program` in a new cage that is a child of this one. The child
    /// gets a fresh table holding only the console handles; nothing is
    /// inherited. Returns the child's id without waiting for it.
    ///
    /// ### Errors
    ///
    /// * `InvalidArgument` - empty or overlong program name.
    /// * `LoadError` - no program is registered under that name.
    /// * `TableFull` - `MAX_CAGES` cages are already live.
    pub fn exec(&self, program: &str, argv: &[String]) -> SysResult<u64> {
        check_name(program)?;
        let entry = match PROGRAM_TABLE.get(program) {
            Some(entry) => *entry,
            None => return Err(SysError::LoadError),
        };
        reserve_cage_slot()?;

        let childid = NEXT_CAGEID.fetch_add(1, interface::RustAtomicOrdering::SeqCst);
        let child = interface::RustRfc::new(Cage::new(childid, self.cageid, argv.to_vec()));
        self.children.insert(childid, child.exitcell.clone());
        cagetable_insert(childid, child.clone());
        log::debug!(target: "safedesc::sys", "cage {} exec {} as cage {}", self.cageid, program, childid);

        interface::helper_thread(move || run_program(child, entry));
        Ok(childid)
    }

    pub fn exec_syscall(&self, program: &str, argv: &[&str]) -> i32 {
        let argv: Vec<String> = argv.iter().map(|arg| arg.to_string()).collect();
        let result = self.exec(program, &argv).map(|childid| childid as i32);
        self.syscall_return(result, "exec")
    }

    /// ### Description
    ///
    /// Waits for child `pid` to terminate and returns how it ended. Each
    /// child can be joined once; the first join claims it.
    ///
    /// ### Errors
    ///
    /// * `InvalidPid` - `pid` is not an unjoined child of this cage.
    pub fn join(&self, pid: u64) -> SysResult<ExitStatus> {
        let (_, exitcell) = self.children.remove(&pid).ok_or(SysError::InvalidPid)?;
        log::trace!(target: "safedesc::sys", "cage {} joining cage {}", self.cageid, pid);
        Ok(exitcell.wait())
    }

    /// 1 when the child exited, with its status stored in `status`; 0 when it
    /// terminated abnormally; -1 on error.
    pub fn join_syscall(&self, pid: i32, status: &mut i32) -> i32 {
        let result = if pid < 0 {
            Err(SysError::InvalidPid)
        } else {
            self.join(pid as u64)
        };
        let result = result.map(|exitstatus| match exitstatus {
            ExitStatus::Exited(code) => {
                *status = code;
                JOIN_NORMAL
            }
            ExitStatus::Abnormal => JOIN_ABNORMAL,
        });
        self.syscall_return(result, "join")
    }

    /// Ends the calling program and does not return. The cage is torn down
    /// before the program's thread unwinds, so a joining parent sees every
    /// descriptor released.
    ///
    /// The init cage runs on the embedder's thread, not a program thread, so
    /// it cannot exit; it gets `NotPermitted` (`-1`) and should `halt`.
    pub fn exit_syscall(&self, status: i32) -> i32 {
        if self.cageid == INIT_CAGEID {
            return self.syscall_return(Err(SysError::NotPermitted), "exit");
        }
        log::debug!(target: "safedesc::sys", "cage {} exit {}", self.cageid, status);
        self.terminate(ExitStatus::Exited(status));
        resume_unwind(Box::new(ProcessExit(status)))
    }

    pub fn terminate(&self, status: ExitStatus) {
        self.drain_fdtable();

        for child in self.children.iter() {
            if let Some(childcage) = cagetable_getref(*child.key()) {
                childcage
                    .parent
                    .store(ORPHANED, interface::RustAtomicOrdering::SeqCst);
            }
        }
        self.children.clear();

        if cagetable_remove(self.cageid).is_some() {
            LIVE_CAGES.fetch_sub(1, interface::RustAtomicOrdering::SeqCst);
        }
        self.exitcell.post(status);
    }

    /// Shuts the kernel down. Only the init cage may.
    pub fn halt(&self) -> SysResult<()> {
        if self.cageid != INIT_CAGEID {
            return Err(SysError::NotPermitted);
        }
        log::info!(target: "safedesc::sys", "halt requested by cage {}", self.cageid);
        crate::safeposix::dispatcher::kernelfinalize();
        Ok(())
    }

    pub fn halt_syscall(&self) -> i32 {
        self.syscall_return(self.halt().map(|_| 0), "halt")
    }
}
