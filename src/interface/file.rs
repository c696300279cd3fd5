// File related interface
//
// The kernel never touches host files directly: each file object owns a
// numbered slot in a BackingStore, and the name table that maps names onto
// those numbers lives in kernel metadata.

use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
pub use std::path::{Path as RustPath, PathBuf as RustPathBuf};
use std::sync::Arc;

use super::misc::RustHashMap;

pub const METADATAFILENAME: &str = "lind.metadata";
pub const FILEDATAPREFIX: &str = "linddata.";

fn missing(id: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no backing data for object {}", id),
    )
}

/// Byte storage for file objects, addressed by object id.
pub trait BackingStore: Send + Sync + fmt::Debug {
    /// Creates an empty entry, or empties an existing one.
    fn create(&self, id: usize) -> io::Result<()>;
    fn readat(&self, id: usize, buf: &mut [u8], offset: usize) -> io::Result<usize>;
    /// Writes past the current end fill the gap with zeros.
    fn writeat(&self, id: usize, buf: &[u8], offset: usize) -> io::Result<usize>;
    fn truncate(&self, id: usize, length: usize) -> io::Result<()>;
    fn size(&self, id: usize) -> io::Result<usize>;
    fn remove(&self, id: usize) -> io::Result<()>;
    fn sync(&self, id: usize) -> io::Result<()>;
    /// Ids with data present in the store.
    fn ids(&self) -> Vec<usize>;

    // Stores that outlive the kernel keep the metadata blob next to the data
    fn write_metadata(&self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }
    fn read_metadata(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct MemStore {
    objects: RustHashMap<usize, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore {
            objects: RustHashMap::new(),
        }
    }
}

impl BackingStore for MemStore {
    fn create(&self, id: usize) -> io::Result<()> {
        self.objects.insert(id, Vec::new());
        Ok(())
    }

    fn readat(&self, id: usize, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        let data = self.objects.get(&id).ok_or_else(|| missing(id))?;
        if offset >= data.len() {
            return Ok(0);
        }
        let count = buf.len().min(data.len() - offset);
        buf[..count].copy_from_slice(&data[offset..offset + count]);
        Ok(count)
    }

    fn writeat(&self, id: usize, buf: &[u8], offset: usize) -> io::Result<usize> {
        let mut data = self.objects.get_mut(&id).ok_or_else(|| missing(id))?;
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn truncate(&self, id: usize, length: usize) -> io::Result<()> {
        let mut data = self.objects.get_mut(&id).ok_or_else(|| missing(id))?;
        data.resize(length, 0);
        Ok(())
    }

    fn size(&self, id: usize) -> io::Result<usize> {
        self.objects
            .get(&id)
            .map(|data| data.len())
            .ok_or_else(|| missing(id))
    }

    fn remove(&self, id: usize) -> io::Result<()> {
        self.objects.remove(&id).map(|_| ()).ok_or_else(|| missing(id))
    }

    fn sync(&self, id: usize) -> io::Result<()> {
        if self.objects.contains_key(&id) {
            Ok(())
        } else {
            Err(missing(id))
        }
    }

    fn ids(&self) -> Vec<usize> {
        self.objects.iter().map(|entry| *entry.key()).collect()
    }
}

/// One host file per object, `linddata.<id>` under `dir`.
pub struct HostStore {
    dir: RustPathBuf,
    handles: RustHashMap<usize, Arc<Mutex<File>>>,
}

impl fmt::Debug for HostStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStore")
            .field("dir", &self.dir)
            .field("open handles", &self.handles.len())
            .finish()
    }
}

impl HostStore {
    pub fn new<P: AsRef<RustPath>>(dir: P) -> io::Result<HostStore> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(HostStore {
            dir: dir.as_ref().to_path_buf(),
            handles: RustHashMap::new(),
        })
    }

    fn datapath(&self, id: usize) -> RustPathBuf {
        self.dir.join(format!("{}{}", FILEDATAPREFIX, id))
    }

    // Opens lazily so objects restored from metadata cost nothing until used
    fn handle(&self, id: usize) -> io::Result<Arc<Mutex<File>>> {
        if let Some(handle) = self.handles.get(&id) {
            return Ok(handle.clone());
        }
        let path = self.datapath(id);
        if !path.exists() {
            return Err(missing(id));
        }
        let f = OpenOptions::new().read(true).write(true).open(path)?;
        let handle = self
            .handles
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(f)))
            .clone();
        Ok(handle)
    }
}

impl BackingStore for HostStore {
    fn create(&self, id: usize) -> io::Result<()> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.datapath(id))?;
        self.handles.insert(id, Arc::new(Mutex::new(f)));
        Ok(())
    }

    fn readat(&self, id: usize, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        let handle = self.handle(id)?;
        let mut fobj = handle.lock();
        fobj.seek(SeekFrom::Start(offset as u64))?;
        let mut total = 0;
        while total < buf.len() {
            let n = fobj.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn writeat(&self, id: usize, buf: &[u8], offset: usize) -> io::Result<usize> {
        let handle = self.handle(id)?;
        let mut fobj = handle.lock();
        fobj.seek(SeekFrom::Start(offset as u64))?;
        fobj.write_all(buf)?;
        Ok(buf.len())
    }

    fn truncate(&self, id: usize, length: usize) -> io::Result<()> {
        let handle = self.handle(id)?;
        let fobj = handle.lock();
        fobj.set_len(length as u64)
    }

    fn size(&self, id: usize) -> io::Result<usize> {
        let handle = self.handle(id)?;
        let fobj = handle.lock();
        Ok(fobj.metadata()?.len() as usize)
    }

    fn remove(&self, id: usize) -> io::Result<()> {
        self.handles.remove(&id);
        fs::remove_file(self.datapath(id))
    }

    fn sync(&self, id: usize) -> io::Result<()> {
        let handle = self.handle(id)?;
        let fobj = handle.lock();
        fobj.sync_data()
    }

    fn ids(&self) -> Vec<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|entry| {
                entry.ok().and_then(|e| {
                    e.file_name()
                        .to_str()
                        .and_then(|n| n.strip_prefix(FILEDATAPREFIX))
                        .and_then(|n| n.parse::<usize>().ok())
                })
            })
            .collect()
    }

    fn write_metadata(&self, bytes: &[u8]) -> io::Result<()> {
        let mut f = File::create(self.dir.join(METADATAFILENAME))?;
        f.write_all(bytes)?;
        f.sync_all()
    }

    fn read_metadata(&self) -> io::Result<Option<Vec<u8>>> {
        let path = self.dir.join(METADATAFILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}
