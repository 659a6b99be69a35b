//! Backing store adapter
//!
//! Submodules:
//! - `naming`: physical object naming of striped files
//! - `extent`: logical range to physical object mapping
//! - `mem`: in-memory striped cluster used for development and tests
//!
//! The traits below are the boundary towards the striped object store. The
//! adapter only ever talks to a cluster through them, so a real client
//! binding and the in-memory store are interchangeable.
pub mod extent;
pub mod mem;
pub mod naming;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use nix::errno::Errno;

use crate::sync::lock;

pub use naming::{RadosStriperNaming, StripeNaming};

pub type StoreResult<T> = Result<T, Errno>;

/// Cursor over the physical object keys of a pool.
pub type ObjectCursor = Box<dyn Iterator<Item = String> + Send>;

/// Entry point of a store client: creates cluster handles.
pub trait ClusterDriver: Send + Sync {
    /// Creates an unconnected cluster handle acting as `user_id`.
    fn init(&self, user_id: &str) -> StoreResult<Arc<dyn Cluster>>;
}

pub trait Cluster: Send + Sync {
    /// Loads cluster configuration; `None` searches the default locations.
    fn conf_read_file(&self, path: Option<&Path>) -> StoreResult<()>;
    /// Applies configuration overrides taken from the process environment.
    fn conf_parse_env(&self) -> StoreResult<()>;
    fn connect(&self) -> StoreResult<()>;
    fn shutdown(&self);
    fn open_pool(&self, pool: &str) -> StoreResult<Arc<dyn PoolIo>>;
    fn cluster_stat(&self) -> StoreResult<ClusterStat>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterStat {
    pub kb: u64,
    pub kb_used: u64,
    pub kb_avail: u64,
    pub num_objects: u64,
}

/// A binding to one pool.
pub trait PoolIo: Send + Sync {
    fn name(&self) -> &str;
    fn create_striper(&self) -> StoreResult<Box<dyn Striper>>;
    fn list_objects(&self) -> StoreResult<ObjectCursor>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub mtime: SystemTime,
}

/// Striping session over a pool. The layout setters apply to files created
/// through this session.
pub trait Striper: Send + Sync {
    fn set_stripe_count(&mut self, stripe_count: u32) -> StoreResult<()>;
    fn set_stripe_unit(&mut self, stripe_unit: u64) -> StoreResult<()>;
    fn set_object_size(&mut self, object_size: u64) -> StoreResult<()>;

    /// Writes the whole buffer at `offset` or fails.
    fn write(&self, name: &str, data: &[u8], offset: u64) -> StoreResult<()>;
    /// Reads up to `len` bytes at `offset`; short at end of file.
    fn read(&self, name: &str, len: usize, offset: u64) -> StoreResult<Bytes>;
    fn stat(&self, name: &str) -> StoreResult<ObjectStat>;
    fn trunc(&self, name: &str, size: u64) -> StoreResult<()>;
    fn remove(&self, name: &str) -> StoreResult<()>;

    fn getxattr(&self, name: &str, attr: &str) -> StoreResult<Bytes>;
    fn setxattr(&self, name: &str, attr: &str, value: &[u8]) -> StoreResult<()>;
    fn rmxattr(&self, name: &str, attr: &str) -> StoreResult<()>;
    fn getxattrs(&self, name: &str) -> StoreResult<BTreeMap<String, Bytes>>;

    /// Submits an asynchronous write; `completion` fires on a store thread.
    fn aio_write(
        &self,
        name: &str,
        data: Bytes,
        offset: u64,
        completion: Arc<AioCompletion>,
    ) -> StoreResult<()>;
    /// Submits an asynchronous read; `completion` fires on a store thread
    /// with the bytes read.
    fn aio_read(
        &self,
        name: &str,
        len: usize,
        offset: u64,
        completion: Arc<AioCompletion>,
    ) -> StoreResult<()>;
}

type CompletionFn = Box<dyn FnOnce(StoreResult<usize>, Bytes) + Send>;

/// Completion record of an asynchronous store call.
///
/// Shared between the submitter and the store. The callback runs at most
/// once: either `complete` runs it, or `release` drops it unrun.
pub struct AioCompletion {
    callback: Mutex<Option<CompletionFn>>,
}

impl AioCompletion {
    pub fn new<F>(callback: F) -> Arc<Self>
    where
        F: FnOnce(StoreResult<usize>, Bytes) + Send + 'static,
    {
        Arc::new(Self {
            callback: Mutex::new(Some(Box::new(callback))),
        })
    }

    /// Runs the callback with the operation's return value. Returns false if
    /// the completion already fired or was released.
    pub fn complete(&self, rc: StoreResult<usize>, data: Bytes) -> bool {
        let callback = lock(&self.callback).take();
        match callback {
            Some(callback) => {
                callback(rc, data);
                true
            }
            None => false,
        }
    }

    /// Drops the callback without running it.
    pub fn release(&self) {
        lock(&self.callback).take();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.callback).is_some()
    }
}
