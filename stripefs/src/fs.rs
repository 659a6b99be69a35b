//! The adapter context: POSIX-shaped file operations over striped objects.
//!
//! Every entry point resolves a [`FileIdentity`], either from a path or from
//! an open descriptor, fetches the pooled session for its layout and calls
//! into the striper. The descriptor table lock is never held across a store
//! call.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::Whence;
use tracing::debug;

use crate::aio::{AioCallback, bridge};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fd::{DescriptorTable, Fd, OpenFile};
use crate::params::{Env, FileIdentity, Layout};
use crate::pool::{SessionHandle, SessionPool};
use crate::store::{ClusterDriver, RadosStriperNaming, StripeNaming};
use crate::sync::lock;

/// Permission bits reported for every file.
pub const FILE_MODE: u32 = 0o666;

/// Minimal stat: one timestamp copied into all three time fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub mode: Mode,
}

impl FileStat {
    fn new(size: u64, time: SystemTime) -> Self {
        Self {
            size,
            atime: time,
            mtime: time,
            ctime: time,
            mode: Mode::from_bits_truncate(FILE_MODE),
        }
    }
}

pub struct StripeFs {
    pub(crate) defaults: Layout,
    pub(crate) sessions: SessionPool,
    pub(crate) files: Mutex<DescriptorTable>,
    pub(crate) naming: Arc<dyn StripeNaming>,
}

impl StripeFs {
    pub fn new(config: &Config, driver: Arc<dyn ClusterDriver>) -> Result<Self> {
        Self::with_naming(config, driver, Arc::new(RadosStriperNaming))
    }

    /// Like [`StripeFs::new`], for stores following another object naming
    /// convention.
    pub fn with_naming(
        config: &Config,
        driver: Arc<dyn ClusterDriver>,
        naming: Arc<dyn StripeNaming>,
    ) -> Result<Self> {
        let defaults = match config.defaults.as_deref() {
            Some(s) => s.parse::<Layout>()?,
            None => Layout::default(),
        };
        debug!("default layout {defaults}");
        Ok(Self {
            defaults,
            sessions: SessionPool::new(driver, config.conf_file.clone()),
            files: Mutex::new(DescriptorTable::new()),
            naming,
        })
    }

    pub fn defaults(&self) -> &Layout {
        &self.defaults
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    pub fn resolve(&self, env: Option<&Env>, path: &str) -> Result<FileIdentity> {
        FileIdentity::resolve(path, env, &self.defaults)
    }

    pub(crate) fn session(&self, identity: &FileIdentity) -> Result<SessionHandle> {
        self.sessions.acquire(&identity.layout)
    }

    /// Snapshot of the state behind `fd`.
    pub(crate) fn file(&self, fd: Fd) -> Result<OpenFile> {
        lock(&self.files).get(fd).cloned()
    }

    pub fn open(&self, env: Option<&Env>, path: &str, flags: OFlag, mode: Mode) -> Result<Fd> {
        let identity = self.resolve(env, path)?;
        if flags.contains(OFlag::O_CREAT | OFlag::O_EXCL) {
            let session = self.session(&identity)?;
            match session.striper().stat(&identity.name) {
                Ok(_) => return Err(Error::AlreadyExists(identity.name)),
                Err(e) if e == Errno::ENOENT => {}
                Err(e) => return Err(e.into()),
            }
        }
        if flags.contains(OFlag::O_TRUNC) {
            let session = self.session(&identity)?;
            match session.striper().trunc(&identity.name, 0) {
                Err(e) if e != Errno::ENOENT => return Err(e.into()),
                _ => {}
            }
        }
        let fd = lock(&self.files).insert(OpenFile::new(identity, flags, mode))?;
        debug!("open: fd {fd} associated to {path}");
        Ok(fd)
    }

    pub fn close(&self, fd: Fd) -> Result<()> {
        lock(&self.files).remove(fd)?;
        debug!("close: closed fd {fd}");
        Ok(())
    }

    /// Moves the cursor of `fd`. Only [`Whence::SeekSet`] and
    /// [`Whence::SeekCur`] are supported; the result may be negative.
    pub fn lseek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<i64> {
        let mut files = lock(&self.files);
        let file = files.get_mut(fd)?;
        debug!("lseek: fd {fd}, offset={offset}, whence={whence:?}");
        let cursor = match whence {
            Whence::SeekSet => offset,
            Whence::SeekCur => file.cursor.checked_add(offset).ok_or_else(|| {
                Error::InvalidArgument(format!("cursor {} + {offset} overflows", file.cursor))
            })?,
            other => return Err(Error::InvalidArgument(format!("whence {other:?}"))),
        };
        file.cursor = cursor;
        Ok(cursor)
    }

    pub fn lseek64(&self, fd: Fd, offset: i64, whence: Whence) -> Result<i64> {
        self.lseek(fd, offset, whence)
    }

    fn readable(&self, fd: Fd) -> Result<OpenFile> {
        let file = self.file(fd)?;
        if !file.is_readable() {
            return Err(Error::BadDescriptor(fd));
        }
        Ok(file)
    }

    fn writable(&self, fd: Fd) -> Result<OpenFile> {
        let file = self.file(fd)?;
        if !file.is_writable() {
            return Err(Error::BadDescriptor(fd));
        }
        Ok(file)
    }

    /// Places the cursor `n` bytes past `base`, the position the transfer
    /// started from. A seek racing the transfer is overwritten.
    fn advance(&self, fd: Fd, base: i64, n: usize) {
        if let Ok(file) = lock(&self.files).get_mut(fd) {
            file.cursor = base.saturating_add(n as i64);
        }
    }

    fn read_at(&self, file: &OpenFile, buf: &mut [u8], offset: i64) -> Result<usize> {
        let offset = store_offset(offset)?;
        let session = self.session(&file.identity)?;
        let data = session.striper().read(&file.identity.name, buf.len(), offset)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write_at(&self, file: &OpenFile, buf: &[u8], offset: i64) -> Result<usize> {
        let offset = store_offset(offset)?;
        let session = self.session(&file.identity)?;
        session.striper().write(&file.identity.name, buf, offset)?;
        Ok(buf.len())
    }

    /// Reads at the cursor and advances it by the bytes read.
    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let file = self.readable(fd)?;
        debug!("read: for fd {fd}, count={}", buf.len());
        let n = self.read_at(&file, buf, file.cursor)?;
        self.advance(fd, file.cursor, n);
        Ok(n)
    }

    pub fn pread(&self, fd: Fd, buf: &mut [u8], offset: i64) -> Result<usize> {
        let file = self.readable(fd)?;
        debug!("pread: for fd {fd}, count={}, offset={offset}", buf.len());
        self.read_at(&file, buf, offset)
    }

    /// Writes the whole buffer at the cursor and advances it.
    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let file = self.writable(fd)?;
        debug!("write: for fd {fd}, count={}", buf.len());
        let n = self.write_at(&file, buf, file.cursor)?;
        self.advance(fd, file.cursor, n);
        Ok(n)
    }

    pub fn pwrite(&self, fd: Fd, buf: &[u8], offset: i64) -> Result<usize> {
        let file = self.writable(fd)?;
        debug!("pwrite: for fd {fd}, count={}, offset={offset}", buf.len());
        self.write_at(&file, buf, offset)
    }

    /// Submits an asynchronous write of `data` at `offset`. On success
    /// `callback` later receives `data.len()`; if submission fails it is
    /// dropped unrun and the error is returned here.
    pub fn aio_write(&self, fd: Fd, offset: i64, data: Bytes, callback: AioCallback) -> Result<()> {
        let file = self.writable(fd)?;
        debug!("aio_write: for fd {fd}, count={}, offset={offset}", data.len());
        let offset = store_offset(offset)?;
        let session = self.session(&file.identity)?;
        let completion = bridge(data.len(), callback);
        if let Err(e) = session
            .striper()
            .aio_write(&file.identity.name, data, offset, completion.clone())
        {
            completion.release();
            return Err(e.into());
        }
        Ok(())
    }

    /// Submits an asynchronous read of `len` bytes at `offset`. The callback
    /// receives the bytes read along with the requested count.
    pub fn aio_read(&self, fd: Fd, offset: i64, len: usize, callback: AioCallback) -> Result<()> {
        let file = self.readable(fd)?;
        debug!("aio_read: for fd {fd}, count={len}, offset={offset}");
        let offset = store_offset(offset)?;
        let session = self.session(&file.identity)?;
        let completion = bridge(len, callback);
        if let Err(e) = session
            .striper()
            .aio_read(&file.identity.name, len, offset, completion.clone())
        {
            completion.release();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn fstat(&self, fd: Fd) -> Result<FileStat> {
        let file = self.file(fd)?;
        debug!("fstat: fd {fd}");
        let session = self.session(&file.identity)?;
        let st = session.striper().stat(&file.identity.name)?;
        Ok(FileStat::new(st.size, st.mtime))
    }

    /// Path stat. A name absent from the store but open for writing reports
    /// an empty file stamped with the current time.
    pub fn stat(&self, env: Option<&Env>, path: &str) -> Result<FileStat> {
        debug!("stat: {path}");
        let identity = self.resolve(env, path)?;
        let session = self.session(&identity)?;
        match session.striper().stat(&identity.name) {
            Ok(st) => Ok(FileStat::new(st.size, st.mtime)),
            Err(Errno::ENOENT)
                if lock(&self.files).intents().contains(&identity.name) =>
            {
                Ok(FileStat::new(0, SystemTime::now()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Nothing is buffered client side.
    pub fn fsync(&self, fd: Fd) -> Result<()> {
        self.file(fd)?;
        debug!("fsync: fd {fd}");
        Ok(())
    }

    /// Only `F_GETFL` is supported; it returns the flags `fd` was opened with.
    pub fn fcntl(&self, fd: Fd, arg: FcntlArg<'_>) -> Result<OFlag> {
        let file = self.file(fd)?;
        debug!("fcntl: fd {fd} cmd={arg:?}");
        match arg {
            FcntlArg::F_GETFL => Ok(file.flags),
            other => Err(Error::InvalidArgument(format!("fcntl {other:?}"))),
        }
    }

    pub fn truncate(&self, env: Option<&Env>, path: &str, size: u64) -> Result<()> {
        debug!("truncate: {path}, size {size}");
        let identity = self.resolve(env, path)?;
        self.truncate_identity(&identity, size)
    }

    pub fn ftruncate(&self, fd: Fd, size: u64) -> Result<()> {
        let file = self.file(fd)?;
        debug!("ftruncate: fd {fd}, size {size}");
        self.truncate_identity(&file.identity, size)
    }

    fn truncate_identity(&self, identity: &FileIdentity, size: u64) -> Result<()> {
        let session = self.session(identity)?;
        Ok(session.striper().trunc(&identity.name, size)?)
    }

    pub fn unlink(&self, env: Option<&Env>, path: &str) -> Result<()> {
        debug!("unlink: {path}");
        let identity = self.resolve(env, path)?;
        let session = self.session(&identity)?;
        Ok(session.striper().remove(&identity.name)?)
    }

    /// Tears down every pooled session and the cluster connection. Open
    /// descriptors survive and reconnect on their next call.
    pub fn disconnect_all(&self) {
        self.sessions.release_all();
    }
}

fn store_offset(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| Error::InvalidArgument(format!("negative offset {offset}")))
}
