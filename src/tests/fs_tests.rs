#[cfg(test)]
pub mod fs_tests {
    use super::super::*;
    use crate::interface;
    use crate::interface::{Errno, SysError};
    use crate::safeposix::syscalls::fs_calls::transfer_len;
    use crate::safeposix::syscalls::fs_constants::*;
    use crate::safeposix::{cage::*, dispatcher::*, filesystem::fs_metadata};

    fn objid_of(cage: &Cage, fd: i32) -> usize {
        let slot = cage.get_filedescriptor(fd).unwrap();
        let unlocked_fd = slot.read();
        match &*unlocked_fd {
            Some(FileDescriptor::File(filedesc)) => filedesc.objid,
            other => panic!("fd {} is not a file: {:?}", fd, other),
        }
    }

    #[test]
    pub fn ut_fs_handles_are_lowest_free_until_full() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        for (i, expected) in (STARTINGFD..MAXOPENFILES).enumerate() {
            assert_eq!(cage.creat_syscall(&format!("handle{}", i)), expected);
        }
        assert_eq!(cage.creat_syscall("onetoomany"), -1);
        assert_eq!(cage.last_errno(), Errno::EMFILE);
        // a full table creates nothing
        assert_eq!(fs_metadata().open_count("onetoomany"), None);
        assert_eq!(cage.open("handle0"), Err(SysError::TableFull));

        assert_eq!(cage.close_syscall(5), 0);
        assert_eq!(cage.close_syscall(9), 0);
        assert_eq!(cage.open_syscall("handle0"), 5);
        assert_eq!(cage.open_syscall("handle0"), 9);
        assert_eq!(fs_metadata().open_count("handle0"), Some(3));

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_open_missing_name() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        assert_eq!(cage.open_syscall("nothere"), -1);
        assert_eq!(cage.last_errno(), Errno::ENOENT);
        assert_eq!(cage.open("nothere"), Err(SysError::NotFound));
        // a failed open leaves the slot it probed free
        assert_eq!(cage.creat_syscall("nothere"), STARTINGFD);

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_write_close_reopen_read() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let fd = cage.creat_syscall("/foobar");
        assert!(fd >= 0);
        let msg = b"hello there!";
        assert_eq!(cage.write_syscall(fd, msg.as_ptr(), msg.len()), 12);
        assert_eq!(cage.close_syscall(fd), 0);

        let fd = cage.open_syscall("/foobar");
        let mut readbuf1 = sizecbuf(5);
        assert_eq!(cage.read_syscall(fd, readbuf1.as_mut_ptr(), 5), 5);
        assert_eq!(cbuf2str(&readbuf1), "hello");

        let mut readbuf2 = sizecbuf(20);
        assert_eq!(cage.read_syscall(fd, readbuf2.as_mut_ptr(), 20), 7);
        assert_eq!(cbuf2str(&readbuf2[..7]), " there!");
        // at the end now
        assert_eq!(cage.read_syscall(fd, readbuf2.as_mut_ptr(), 20), 0);

        assert_eq!(cage.close_syscall(fd), 0);
        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_cursor_is_per_descriptor() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let writer = cage.creat("shared").unwrap();
        assert_eq!(cage.write(writer, b"abcdef"), Ok(6));
        let reader1 = cage.open("shared").unwrap();
        let reader2 = cage.open("shared").unwrap();
        assert_eq!(objid_of(&cage, reader1), objid_of(&cage, reader2));

        let mut buf = [0u8; 4];
        assert_eq!(cage.read(reader1, &mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
        let mut buf = [0u8; 2];
        assert_eq!(cage.read(reader2, &mut buf), Ok(2));
        assert_eq!(&buf, b"ab");

        // writes through one descriptor are seen through the others
        assert_eq!(cage.write(writer, b"gh"), Ok(2));
        let mut buf = [0u8; 8];
        assert_eq!(cage.read(reader1, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"efgh");

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_unlink_while_open_defers_delete() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let fd1 = cage.creat("victim").unwrap();
        assert_eq!(cage.write(fd1, b"still here"), Ok(10));
        let fd2 = cage.open("victim").unwrap();
        let objid = objid_of(&cage, fd1);

        assert_eq!(cage.unlink_syscall("victim"), 0);
        assert_eq!(cage.open("victim"), Err(SysError::NotFound));
        assert!(fs_metadata().object_exists(objid));

        // the open descriptors keep working
        let mut buf = [0u8; 10];
        assert_eq!(cage.read(fd2, &mut buf), Ok(10));
        assert_eq!(&buf, b"still here");
        assert_eq!(cage.write(fd1, b"!"), Ok(1));

        // the name is immediately free for an unrelated object
        let fresh = cage.creat("victim").unwrap();
        assert_ne!(objid_of(&cage, fresh), objid);
        let mut buf = [0u8; 4];
        assert_eq!(cage.read(fresh, &mut buf), Ok(0));

        assert_eq!(cage.close(fd1), Ok(()));
        assert!(fs_metadata().object_exists(objid));
        assert_eq!(cage.close(fd2), Ok(()));
        assert!(!fs_metadata().object_exists(objid));
        assert_eq!(fs_metadata().open_count("victim"), Some(1));

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_unlink_unopened_deletes_now() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let fd = cage.creat("short").unwrap();
        let objid = objid_of(&cage, fd);
        assert_eq!(cage.close(fd), Ok(()));
        assert!(fs_metadata().object_exists(objid));
        assert_eq!(cage.unlink("short"), Ok(()));
        assert!(!fs_metadata().object_exists(objid));

        assert_eq!(cage.unlink_syscall("short"), -1);
        assert_eq!(cage.last_errno(), Errno::ENOENT);

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_creat_truncates_and_shares() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let fd1 = cage.creat("t").unwrap();
        assert_eq!(cage.write(fd1, b"hello"), Ok(5));
        let fd2 = cage.creat("t").unwrap();
        assert_eq!(objid_of(&cage, fd1), objid_of(&cage, fd2));
        assert_eq!(fs_metadata().open_count("t"), Some(2));

        let mut buf = [0u8; 5];
        assert_eq!(cage.read(fd2, &mut buf), Ok(0));

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_closed_and_bogus_handles() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let fd = cage.creat("closeme").unwrap();
        assert_eq!(cage.close_syscall(fd), 0);
        assert_eq!(cage.close_syscall(fd), -1);
        assert_eq!(cage.last_errno(), Errno::EBADF);

        let mut buf = [0u8; 4];
        assert_eq!(cage.read(fd, &mut buf), Err(SysError::InvalidHandle));
        assert_eq!(cage.write(fd, b"x"), Err(SysError::InvalidHandle));
        assert_eq!(cage.read(-1, &mut buf), Err(SysError::InvalidHandle));
        assert_eq!(cage.write(MAXOPENFILES, b"x"), Err(SysError::InvalidHandle));
        assert_eq!(cage.close(MAXOPENFILES + 100), Err(SysError::InvalidHandle));

        assert_eq!(cage.read_syscall(STDIN_FILENO, std::ptr::null_mut(), 4), -1);
        assert_eq!(cage.last_errno(), Errno::EINVAL);

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_console_direction() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        let mut buf = [0u8; 4];
        assert_eq!(cage.write(STDIN_FILENO, b"nope"), Err(SysError::InvalidHandle));
        assert_eq!(cage.read(STDOUT_FILENO, &mut buf), Err(SysError::InvalidHandle));
        assert_eq!(cage.write(STDOUT_FILENO, b""), Ok(0));

        // closed consoles are gone for good, and never handed out again
        assert_eq!(cage.close(STDIN_FILENO), Ok(()));
        assert_eq!(cage.close(STDIN_FILENO), Err(SysError::InvalidHandle));
        assert_eq!(cage.creat("notzero"), Ok(STARTINGFD));
        assert_eq!(cage.open_fds(), vec![STDOUT_FILENO, STARTINGFD]);

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_bad_names() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        assert_eq!(cage.creat_syscall(""), -1);
        assert_eq!(cage.last_errno(), Errno::EINVAL);
        let long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert_eq!(cage.creat(&long), Err(SysError::InvalidArgument));
        let longest = "a".repeat(MAX_NAME_LENGTH);
        assert_eq!(cage.creat(&longest), Ok(STARTINGFD));

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_host_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = KernelConfig {
            store: StoreConfig::Host {
                dir: dir.path().to_path_buf(),
            },
            ..KernelConfig::default()
        };

        let _thelock = setup::lock_and_init_with(config.clone());
        let cage = setup::initcage();
        let fd = cage.creat("keep").unwrap();
        assert_eq!(cage.write(fd, b"persisted"), Ok(9));
        assert_eq!(cage.close(fd), Ok(()));

        // unlinked while open at shutdown: reclaimed, never comes back
        let tmp = cage.creat("scratch").unwrap();
        assert_eq!(cage.write(tmp, b"scratch data"), Ok(12));
        assert_eq!(cage.unlink("scratch"), Ok(()));

        // still open at shutdown: released, but the name stays
        let dangling = cage.creat("dangling").unwrap();
        assert_eq!(cage.write(dangling, b"zz"), Ok(2));
        kernelfinalize();

        kernelinit_with(config).unwrap();
        let cage = setup::initcage();
        let fd = cage.open("keep").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(cage.read(fd, &mut buf), Ok(9));
        assert_eq!(&buf[..9], b"persisted");
        assert_eq!(cage.open("scratch"), Err(SysError::NotFound));
        let fd = cage.open("dangling").unwrap();
        assert_eq!(cage.read(fd, &mut buf), Ok(2));
        assert_eq!(fs_metadata().open_count("dangling"), Some(1));
        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_memory_store_starts_blank() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();
        assert_eq!(cage.creat("ephemeral"), Ok(STARTINGFD));
        kernelfinalize();

        kernelinit(0);
        let cage = setup::initcage();
        assert_eq!(cage.open("ephemeral"), Err(SysError::NotFound));
        assert_eq!(cage.open_fds(), vec![STDIN_FILENO, STDOUT_FILENO]);
        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_dispatcher_file_calls() {
        let _thelock = setup::lock_and_init();
        let name = std::ffi::CString::new("viadispatch").unwrap();
        let msg = b"over the boundary";

        let fd = dispatcher(1, CREAT_SYSCALL, interface::Arg { dispatch_cstr: name.as_ptr() as *const i8 }, interface::Arg::null(), interface::Arg::null());
        assert_eq!(fd, STARTINGFD);
        assert_eq!(
            dispatcher(1, WRITE_SYSCALL, interface::Arg::int(fd), interface::Arg { dispatch_cbuf: msg.as_ptr() }, interface::Arg::size(msg.len())),
            msg.len() as i32
        );
        assert_eq!(dispatcher(1, CLOSE_SYSCALL, interface::Arg::int(fd), interface::Arg::null(), interface::Arg::null()), 0);

        let fd = dispatcher(1, OPEN_SYSCALL, interface::Arg { dispatch_cstr: name.as_ptr() as *const i8 }, interface::Arg::null(), interface::Arg::null());
        let mut readbuf = sizecbuf(msg.len());
        assert_eq!(
            dispatcher(1, READ_SYSCALL, interface::Arg::int(fd), interface::Arg { dispatch_mutcbuf: readbuf.as_mut_ptr() }, interface::Arg::size(msg.len())),
            msg.len() as i32
        );
        assert_eq!(&*readbuf, &msg[..]);

        assert_eq!(dispatcher(1, UNLINK_SYSCALL, interface::Arg { dispatch_cstr: name.as_ptr() as *const i8 }, interface::Arg::null(), interface::Arg::null()), 0);

        let cage = setup::initcage();
        // malformed arguments are recorded like any other failure
        assert_eq!(dispatcher(1, OPEN_SYSCALL, interface::Arg::null(), interface::Arg::null(), interface::Arg::null()), -1);
        assert_eq!(cage.last_errno(), Errno::EINVAL);
        assert_eq!(dispatcher(1, 99, interface::Arg::null(), interface::Arg::null(), interface::Arg::null()), -1);
        assert_eq!(cage.last_errno(), Errno::EINVAL);
        assert_eq!(dispatcher(4242, CLOSE_SYSCALL, interface::Arg::int(2), interface::Arg::null(), interface::Arg::null()), -1);

        kernelfinalize();
    }

    #[test]
    pub fn ut_fs_transfer_count_fits_result() {
        let _thelock = setup::lock_and_init();
        let cage = setup::initcage();

        // counts past i32::MAX are cut down instead of wrapping negative
        assert_eq!(transfer_len(usize::MAX), i32::MAX as usize);
        assert_eq!(transfer_len(i32::MAX as usize + 1) as i32, i32::MAX);
        assert_eq!(transfer_len(17), 17);

        let fd = cage.creat("counted").unwrap();
        let msg = b"twelve bytes";
        assert_eq!(cage.write_syscall(fd, msg.as_ptr(), msg.len()), 12);
        assert_eq!(cage.close(fd), Ok(()));
        let fd = cage.open("counted").unwrap();
        let mut readbuf = sizecbuf(64);
        // asking for more than is there returns what is there
        assert_eq!(cage.read_syscall(fd, readbuf.as_mut_ptr(), 64), 12);
        assert_eq!(cbuf2str(&readbuf[..12]), "twelve bytes");

        kernelfinalize();
    }
}
