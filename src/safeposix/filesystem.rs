// Filesystem metadata struct
//
// File objects live in an arena keyed by object id. Descriptors hold ids,
// never the objects themselves. The name table is a separate index over the
// arena, so unlinking a name and reclaiming the object are separate steps.

use crate::interface;
use crate::interface::{SysError, SysResult};

use super::syscalls::fs_constants::*;

pub static FS_METADATA: interface::RustLazyGlobal<
    interface::RustLock<interface::RustRfc<FilesystemMetadata>>,
> = interface::RustLazyGlobal::new(|| {
    interface::RustLock::new(interface::RustRfc::new(FilesystemMetadata::blank_fs_init(
        Box::new(interface::MemStore::new()),
    )))
});

/// The metadata the calling syscall should work against.
pub fn fs_metadata() -> interface::RustRfc<FilesystemMetadata> {
    FS_METADATA.read().clone()
}

#[derive(interface::SerdeSerialize, interface::SerdeDeserialize, Debug, Clone)]
pub struct FileObject {
    pub name: String,
    #[serde(skip)] //descriptor references never outlive the kernel, so they are not persisted
    pub open_count: u32,
    #[serde(skip)]
    pub pending_delete: bool,
}

#[derive(interface::SerdeSerialize, interface::SerdeDeserialize, Debug)]
struct PersistedMetadata {
    nextid: usize,
    objects: interface::RustBTreeMap<usize, FileObject>,
}

#[derive(Debug)]
pub struct FilesystemMetadata {
    pub nextid: interface::RustAtomicUsize,
    pub objecttable: interface::RustHashMap<usize, FileObject>,
    pub nametable: interface::RustHashMap<String, usize>,
    pub store: Box<dyn interface::BackingStore>,
}

pub fn check_name(name: &str) -> SysResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(SysError::InvalidArgument);
    }
    Ok(())
}

impl FilesystemMetadata {
    pub fn blank_fs_init(store: Box<dyn interface::BackingStore>) -> FilesystemMetadata {
        FilesystemMetadata {
            nextid: interface::RustAtomicUsize::new(FIRSTOBJECTID),
            objecttable: interface::new_hashmap(),
            nametable: interface::new_hashmap(),
            store: store,
        }
    }

    /// Loads the name table the store was last finalized with. Data files
    /// nothing refers to any more are deleted.
    pub fn load_fs(store: Box<dyn interface::BackingStore>) -> SysResult<FilesystemMetadata> {
        let metadata = FilesystemMetadata::blank_fs_init(store);
        if let Some(bytes) = metadata.store.read_metadata()? {
            let persisted: PersistedMetadata = interface::serde_deserialize_from_bytes(&bytes)
                .map_err(|e| SysError::Io(e.to_string()))?;
            metadata
                .nextid
                .store(persisted.nextid, interface::RustAtomicOrdering::SeqCst);
            for (id, obj) in persisted.objects {
                metadata.nametable.insert(obj.name.clone(), id);
                metadata.objecttable.insert(id, obj);
            }
            log::debug!(target: "safedesc::fs", "restored {} file objects", metadata.objecttable.len());
        }
        metadata.fsck()?;
        Ok(metadata)
    }

    fn fsck(&self) -> SysResult<()> {
        for id in self.store.ids() {
            if !self.objecttable.contains_key(&id) {
                log::debug!(target: "safedesc::fs", "removing orphaned data for object {}", id);
                self.store.remove(id)?;
            }
        }
        Ok(())
    }

    pub fn persist_metadata(&self) -> SysResult<()> {
        let objects = self
            .objecttable
            .iter()
            .filter(|entry| !entry.value().pending_delete)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let persisted = PersistedMetadata {
            nextid: self.nextid.load(interface::RustAtomicOrdering::SeqCst),
            objects: objects,
        };
        let bytes = interface::serde_serialize_to_bytes(&persisted)
            .map_err(|e| SysError::Io(e.to_string()))?;
        self.store.write_metadata(&bytes)?;
        Ok(())
    }

    /// Produces a referenced object for `name`, creating it if the name is
    /// unbound and emptying it if it is.
    pub fn create_object(&self, name: &str) -> SysResult<usize> {
        check_name(name)?;
        // the name shard stays locked until the reference is counted
        match self.nametable.entry(name.to_string()) {
            interface::RustHashEntry::Occupied(entry) => {
                let id = *entry.get();
                let mut obj = self.objecttable.get_mut(&id).ok_or(SysError::Closed)?;
                self.store.truncate(id, 0)?;
                obj.open_count += 1;
                log::trace!(target: "safedesc::fs", "creat truncated {} (object {})", name, id);
                Ok(id)
            }
            interface::RustHashEntry::Vacant(entry) => {
                let id = self
                    .nextid
                    .fetch_add(1, interface::RustAtomicOrdering::SeqCst);
                self.store.create(id)?;
                self.objecttable.insert(
                    id,
                    FileObject {
                        name: name.to_string(),
                        open_count: 1,
                        pending_delete: false,
                    },
                );
                entry.insert(id);
                log::trace!(target: "safedesc::fs", "creat made {} (object {})", name, id);
                Ok(id)
            }
        }
    }

    /// Takes a reference on the object currently bound to `name`.
    pub fn open_object(&self, name: &str) -> SysResult<usize> {
        check_name(name)?;
        let nameentry = self.nametable.get(name).ok_or(SysError::NotFound)?;
        let id = *nameentry;
        let mut obj = self.objecttable.get_mut(&id).ok_or(SysError::NotFound)?;
        obj.open_count += 1;
        drop(obj);
        drop(nameentry);
        Ok(id)
    }

    /// Unbinds `name`. The object goes away now if nothing references it,
    /// otherwise when its last reference is released.
    pub fn unlink_object(&self, name: &str) -> SysResult<()> {
        check_name(name)?;
        let (_, id) = self.nametable.remove(name).ok_or(SysError::NotFound)?;
        let mut obj = match self.objecttable.get_mut(&id) {
            Some(obj) => obj,
            None => return Err(SysError::NotFound),
        };
        if obj.open_count == 0 {
            drop(obj);
            self.reclaim(id)
        } else {
            obj.pending_delete = true;
            log::debug!(
                target: "safedesc::fs",
                "{} unlinked with {} open references, deferring delete",
                name,
                obj.open_count
            );
            Ok(())
        }
    }

    /// Drops one descriptor reference, finishing a deferred delete if this
    /// was the last one.
    pub fn release_object(&self, id: usize) -> SysResult<()> {
        let mut obj = self.objecttable.get_mut(&id).ok_or(SysError::Closed)?;
        obj.open_count = obj.open_count.saturating_sub(1);
        if obj.open_count == 0 && obj.pending_delete {
            // the guard has to go before remove or the shard deadlocks
            drop(obj);
            return self.reclaim(id);
        }
        Ok(())
    }

    fn reclaim(&self, id: usize) -> SysResult<()> {
        if let Some((_, obj)) = self.objecttable.remove(&id) {
            log::debug!(target: "safedesc::fs", "deleting {} (object {})", obj.name, id);
        }
        self.store.remove(id)?;
        Ok(())
    }

    pub fn readat(&self, id: usize, buf: &mut [u8], offset: usize) -> SysResult<usize> {
        if !self.objecttable.contains_key(&id) {
            return Err(SysError::Closed);
        }
        Ok(self.store.readat(id, buf, offset)?)
    }

    pub fn writeat(&self, id: usize, buf: &[u8], offset: usize) -> SysResult<usize> {
        // held across the write so unlink cannot release the object under it
        let _obj = self.objecttable.get_mut(&id).ok_or(SysError::Closed)?;
        Ok(self.store.writeat(id, buf, offset)?)
    }

    /// Open references to the object bound to `name`, if any.
    pub fn open_count(&self, name: &str) -> Option<u32> {
        let id = *self.nametable.get(name)?;
        self.objecttable.get(&id).map(|obj| obj.open_count)
    }

    pub fn object_exists(&self, id: usize) -> bool {
        self.objecttable.contains_key(&id)
    }

    pub fn sync_all(&self) -> SysResult<()> {
        for entry in self.objecttable.iter() {
            self.store.sync(*entry.key())?;
        }
        Ok(())
    }
}
