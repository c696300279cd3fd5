mod fs_tests;

#[cfg(test)]
pub mod setup {
    use crate::interface;
    use crate::safeposix::{cage::*, dispatcher::*};

    // every test below shares the kernel globals, so they take turns
    static TESTMUTEX: interface::RustLazyGlobal<interface::Mutex<()>> =
        interface::RustLazyGlobal::new(|| interface::Mutex::new(()));

    pub fn lock_and_init() -> interface::MutexGuard<'static, ()> {
        lock_and_init_with(KernelConfig::default())
    }

    pub fn lock_and_init_with(config: KernelConfig) -> interface::MutexGuard<'static, ()> {
        let guard = TESTMUTEX.lock();
        kernelinit_with(config).unwrap();
        guard
    }

    pub fn initcage() -> interface::RustRfc<Cage> {
        cagetable_getref(1).unwrap()
    }
}

#[cfg(test)]
pub fn sizecbuf(size: usize) -> Box<[u8]> {
    let v = vec![0u8; size];
    v.into_boxed_slice()
}

#[cfg(test)]
pub fn cbuf2str(buf: &[u8]) -> &str {
    std::str::from_utf8(buf).unwrap()
}
