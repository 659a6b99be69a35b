//! In-memory striped cluster.
//!
//! Files are cut into physical objects exactly as a striping client would
//! (see [`file_to_extents`]) and named through a [`StripeNaming`], so object
//! listings look like the ones of a real pool. Asynchronous calls complete on
//! a store-owned finisher thread. Faults can be injected at each connect step
//! and at asynchronous submission.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use bytes::Bytes;
use nix::errno::Errno;
use tokio::runtime::{Handle, Runtime};

use super::extent::{StripeLayout, file_to_extents, object_count};
use super::naming::{RadosStriperNaming, StripeNaming};
use super::{
    AioCompletion, Cluster, ClusterDriver, ClusterStat, ObjectCursor, ObjectStat, PoolIo,
    StoreResult, Striper,
};
use crate::params::{DEFAULT_OBJECT_SIZE, DEFAULT_POOL, DEFAULT_STRIPE_COUNT, DEFAULT_STRIPE_UNIT};
use crate::sync::{lock, read, write};

/// Stripe units must be a multiple of this.
pub const STRIPE_UNIT_ALIGN: u64 = 64 * 1024;
/// Reported capacity unless configured otherwise: 1 TiB.
pub const DEFAULT_CAPACITY_KB: u64 = 1024 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Init,
    ConfReadFile,
    ConfParseEnv,
    Connect,
    OpenPool,
    AioSubmit,
}

#[derive(Default)]
struct Faults {
    armed: Mutex<HashMap<FaultPoint, Errno>>,
}

impl Faults {
    fn check(&self, point: FaultPoint) -> StoreResult<()> {
        match lock(&self.armed).get(&point) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FileMeta {
    layout: StripeLayout,
    size: u64,
}

struct MemObject {
    data: Vec<u8>,
    xattrs: BTreeMap<String, Bytes>,
    // only set on the first object of a file
    file: Option<FileMeta>,
    mtime: SystemTime,
}

impl MemObject {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            xattrs: BTreeMap::new(),
            file: None,
            mtime: SystemTime::now(),
        }
    }
}

type Objects = BTreeMap<String, MemObject>;

struct MemPool {
    name: String,
    naming: Arc<dyn StripeNaming>,
    objects: RwLock<Objects>,
    faults: Arc<Faults>,
    finisher: Handle,
}

impl MemPool {
    fn used_bytes(&self) -> (u64, u64) {
        let objects = read(&self.objects);
        let bytes = objects.values().map(|o| o.data.len() as u64).sum();
        (bytes, objects.len() as u64)
    }
}

struct MemBackend {
    pools: RwLock<HashMap<String, Arc<MemPool>>>,
    naming: Arc<dyn StripeNaming>,
    faults: Arc<Faults>,
    capacity_kb: u64,
    inits: AtomicUsize,
    live: AtomicUsize,
    finisher: Option<Runtime>,
}

impl Drop for MemBackend {
    fn drop(&mut self) {
        if let Some(rt) = self.finisher.take() {
            rt.shutdown_background();
        }
    }
}

/// Driver of the in-memory cluster. Clones share the same cluster state.
#[derive(Clone)]
pub struct MemDriver {
    backend: Arc<MemBackend>,
}

impl MemDriver {
    /// A cluster with the `default` pool and [`DEFAULT_CAPACITY_KB`].
    pub fn new() -> std::io::Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY_KB)
    }

    pub fn with_capacity(capacity_kb: u64) -> std::io::Result<Self> {
        Self::with_naming(capacity_kb, Arc::new(RadosStriperNaming))
    }

    pub fn with_naming(capacity_kb: u64, naming: Arc<dyn StripeNaming>) -> std::io::Result<Self> {
        let finisher = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(4)
            .thread_name("mem-finisher")
            .build()?;
        let driver = Self {
            backend: Arc::new(MemBackend {
                pools: RwLock::new(HashMap::new()),
                naming,
                faults: Arc::new(Faults::default()),
                capacity_kb,
                inits: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                finisher: Some(finisher),
            }),
        };
        driver.create_pool(DEFAULT_POOL);
        Ok(driver)
    }

    /// Creates `name` unless it already exists.
    pub fn create_pool(&self, name: &str) {
        let b = &self.backend;
        let Some(finisher) = b.finisher.as_ref().map(|rt| rt.handle().clone()) else {
            return;
        };
        write(&b.pools)
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemPool {
                    name: name.to_string(),
                    naming: b.naming.clone(),
                    objects: RwLock::new(BTreeMap::new()),
                    faults: b.faults.clone(),
                    finisher,
                })
            });
    }

    /// Sorted physical object keys of `pool`.
    pub fn object_keys(&self, pool: &str) -> Vec<String> {
        read(&self.backend.pools)
            .get(pool)
            .map(|p| read(&p.objects).keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn inject(&self, point: FaultPoint, errno: Errno) {
        lock(&self.backend.faults.armed).insert(point, errno);
    }

    pub fn clear_faults(&self) {
        lock(&self.backend.faults.armed).clear();
    }

    /// Number of cluster handles created so far.
    pub fn inits(&self) -> usize {
        self.backend.inits.load(Ordering::SeqCst)
    }

    /// Number of connected cluster handles not yet shut down.
    pub fn live_clusters(&self) -> usize {
        self.backend.live.load(Ordering::SeqCst)
    }
}

impl ClusterDriver for MemDriver {
    fn init(&self, user_id: &str) -> StoreResult<Arc<dyn Cluster>> {
        self.backend.faults.check(FaultPoint::Init)?;
        self.backend.inits.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemCluster {
            backend: self.backend.clone(),
            user_id: user_id.to_string(),
            state: Mutex::new(ClusterState::Configuring),
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClusterState {
    Configuring,
    Connected,
    Shutdown,
}

struct MemCluster {
    backend: Arc<MemBackend>,
    user_id: String,
    state: Mutex<ClusterState>,
}

impl MemCluster {
    fn ensure_connected(&self) -> StoreResult<()> {
        match *lock(&self.state) {
            ClusterState::Connected => Ok(()),
            _ => Err(Errno::ENOTCONN),
        }
    }
}

impl Cluster for MemCluster {
    fn conf_read_file(&self, path: Option<&Path>) -> StoreResult<()> {
        self.backend.faults.check(FaultPoint::ConfReadFile)?;
        match path {
            Some(p) if !p.exists() => Err(Errno::ENOENT),
            _ => Ok(()),
        }
    }

    fn conf_parse_env(&self) -> StoreResult<()> {
        self.backend.faults.check(FaultPoint::ConfParseEnv)
    }

    fn connect(&self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        match *state {
            ClusterState::Connected => return Err(Errno::EISCONN),
            ClusterState::Shutdown => return Err(Errno::ESHUTDOWN),
            ClusterState::Configuring => {}
        }
        self.backend.faults.check(FaultPoint::Connect)?;
        *state = ClusterState::Connected;
        self.backend.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(user = %self.user_id, "in-memory cluster connected");
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        if *state == ClusterState::Connected {
            self.backend.live.fetch_sub(1, Ordering::SeqCst);
        }
        *state = ClusterState::Shutdown;
    }

    fn open_pool(&self, pool: &str) -> StoreResult<Arc<dyn PoolIo>> {
        self.ensure_connected()?;
        self.backend.faults.check(FaultPoint::OpenPool)?;
        let pool = read(&self.backend.pools)
            .get(pool)
            .cloned()
            .ok_or(Errno::ENOENT)?;
        Ok(Arc::new(MemPoolIo { pool }))
    }

    fn cluster_stat(&self) -> StoreResult<ClusterStat> {
        self.ensure_connected()?;
        let (bytes, num_objects) = read(&self.backend.pools)
            .values()
            .map(|p| p.used_bytes())
            .fold((0, 0), |(b, n), (pb, pn)| (b + pb, n + pn));
        let kb = self.backend.capacity_kb;
        let kb_used = bytes.div_ceil(1024);
        Ok(ClusterStat {
            kb,
            kb_used,
            kb_avail: kb.saturating_sub(kb_used),
            num_objects,
        })
    }
}

impl Drop for MemCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct MemPoolIo {
    pool: Arc<MemPool>,
}

impl PoolIo for MemPoolIo {
    fn name(&self) -> &str {
        &self.pool.name
    }

    fn create_striper(&self) -> StoreResult<Box<dyn Striper>> {
        Ok(Box::new(MemStriper {
            pool: self.pool.clone(),
            layout: StripeLayout {
                stripe_unit: DEFAULT_STRIPE_UNIT,
                stripe_count: DEFAULT_STRIPE_COUNT,
                object_size: DEFAULT_OBJECT_SIZE,
            },
        }))
    }

    fn list_objects(&self) -> StoreResult<ObjectCursor> {
        let keys: Vec<String> = read(&self.pool.objects).keys().cloned().collect();
        Ok(Box::new(keys.into_iter()))
    }
}

#[derive(Clone)]
struct MemStriper {
    pool: Arc<MemPool>,
    layout: StripeLayout,
}

impl MemStriper {
    fn key(&self, name: &str, object_no: u64) -> String {
        self.pool.naming.object_key(name, object_no)
    }

    fn meta(&self, objects: &Objects, name: &str) -> StoreResult<FileMeta> {
        objects
            .get(&self.key(name, 0))
            .and_then(|o| o.file)
            .ok_or(Errno::ENOENT)
    }

    fn first_mut<'a>(&self, objects: &'a mut Objects, name: &str) -> StoreResult<&'a mut MemObject> {
        objects
            .get_mut(&self.key(name, 0))
            .filter(|o| o.file.is_some())
            .ok_or(Errno::ENOENT)
    }
}

impl Striper for MemStriper {
    fn set_stripe_count(&mut self, stripe_count: u32) -> StoreResult<()> {
        if stripe_count == 0 {
            return Err(Errno::EINVAL);
        }
        self.layout.stripe_count = stripe_count;
        Ok(())
    }

    fn set_stripe_unit(&mut self, stripe_unit: u64) -> StoreResult<()> {
        if stripe_unit == 0 || stripe_unit % STRIPE_UNIT_ALIGN != 0 {
            return Err(Errno::EINVAL);
        }
        self.layout.stripe_unit = stripe_unit;
        Ok(())
    }

    fn set_object_size(&mut self, object_size: u64) -> StoreResult<()> {
        if object_size == 0 || object_size % self.layout.stripe_unit != 0 {
            return Err(Errno::EINVAL);
        }
        self.layout.object_size = object_size;
        Ok(())
    }

    fn write(&self, name: &str, data: &[u8], offset: u64) -> StoreResult<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(Errno::EFBIG)?;
        let mut objects = write(&self.pool.objects);
        let first = self.key(name, 0);
        let meta = match objects.get(&first).and_then(|o| o.file) {
            Some(meta) => meta,
            None => {
                let meta = FileMeta {
                    layout: self.layout,
                    size: 0,
                };
                objects.entry(first.clone()).or_insert_with(MemObject::new).file = Some(meta);
                meta
            }
        };

        let now = SystemTime::now();
        for ext in file_to_extents(meta.layout, offset, data.len()) {
            let obj = objects
                .entry(self.key(name, ext.object_no))
                .or_insert_with(MemObject::new);
            let start = ext.offset_in_object as usize;
            let stop = start + ext.len;
            if obj.data.len() < stop {
                obj.data.resize(stop, 0);
            }
            obj.data[start..stop]
                .copy_from_slice(&data[ext.buffer_offset..ext.buffer_offset + ext.len]);
            obj.mtime = now;
        }
        if let Some(obj) = objects.get_mut(&first) {
            obj.file = Some(FileMeta {
                layout: meta.layout,
                size: meta.size.max(end),
            });
            obj.mtime = now;
        }
        Ok(())
    }

    fn read(&self, name: &str, len: usize, offset: u64) -> StoreResult<Bytes> {
        let objects = read(&self.pool.objects);
        let meta = self.meta(&objects, name)?;
        if offset >= meta.size {
            return Ok(Bytes::new());
        }
        let len = (len as u64).min(meta.size - offset) as usize;
        let mut out = vec![0u8; len];
        for ext in file_to_extents(meta.layout, offset, len) {
            let Some(obj) = objects.get(&self.key(name, ext.object_no)) else {
                continue;
            };
            let start = ext.offset_in_object as usize;
            let stop = (start + ext.len).min(obj.data.len());
            if start < stop {
                out[ext.buffer_offset..ext.buffer_offset + (stop - start)]
                    .copy_from_slice(&obj.data[start..stop]);
            }
        }
        Ok(Bytes::from(out))
    }

    fn stat(&self, name: &str) -> StoreResult<ObjectStat> {
        let objects = read(&self.pool.objects);
        let meta = self.meta(&objects, name)?;
        let mtime = objects
            .get(&self.key(name, 0))
            .map(|o| o.mtime)
            .ok_or(Errno::ENOENT)?;
        Ok(ObjectStat {
            size: meta.size,
            mtime,
        })
    }

    fn trunc(&self, name: &str, size: u64) -> StoreResult<()> {
        let mut objects = write(&self.pool.objects);
        let meta = self.meta(&objects, name)?;
        if size < meta.size {
            let cut = usize::try_from(meta.size - size).map_err(|_| Errno::EFBIG)?;
            for ext in file_to_extents(meta.layout, size, cut) {
                let Some(obj) = objects.get_mut(&self.key(name, ext.object_no)) else {
                    continue;
                };
                let start = ext.offset_in_object as usize;
                let stop = (start + ext.len).min(obj.data.len());
                if start >= stop {
                    continue;
                }
                if stop == obj.data.len() {
                    obj.data.truncate(start);
                } else {
                    obj.data[start..stop].fill(0);
                }
            }
            let keep = object_count(meta.layout, size);
            for object_no in keep..object_count(meta.layout, meta.size) {
                objects.remove(&self.key(name, object_no));
            }
        }
        let first = self.first_mut(&mut objects, name)?;
        first.file = Some(FileMeta {
            layout: meta.layout,
            size,
        });
        first.mtime = SystemTime::now();
        Ok(())
    }

    fn remove(&self, name: &str) -> StoreResult<()> {
        let mut objects = write(&self.pool.objects);
        let meta = self.meta(&objects, name)?;
        for object_no in 0..object_count(meta.layout, meta.size) {
            objects.remove(&self.key(name, object_no));
        }
        Ok(())
    }

    fn getxattr(&self, name: &str, attr: &str) -> StoreResult<Bytes> {
        let objects = read(&self.pool.objects);
        self.meta(&objects, name)?;
        objects
            .get(&self.key(name, 0))
            .and_then(|o| o.xattrs.get(attr).cloned())
            .ok_or(Errno::ENODATA)
    }

    fn setxattr(&self, name: &str, attr: &str, value: &[u8]) -> StoreResult<()> {
        let mut objects = write(&self.pool.objects);
        let first = self.first_mut(&mut objects, name)?;
        first
            .xattrs
            .insert(attr.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn rmxattr(&self, name: &str, attr: &str) -> StoreResult<()> {
        let mut objects = write(&self.pool.objects);
        let first = self.first_mut(&mut objects, name)?;
        first.xattrs.remove(attr).map(|_| ()).ok_or(Errno::ENODATA)
    }

    fn getxattrs(&self, name: &str) -> StoreResult<BTreeMap<String, Bytes>> {
        let objects = read(&self.pool.objects);
        self.meta(&objects, name)?;
        Ok(objects
            .get(&self.key(name, 0))
            .map(|o| o.xattrs.clone())
            .unwrap_or_default())
    }

    fn aio_write(
        &self,
        name: &str,
        data: Bytes,
        offset: u64,
        completion: Arc<AioCompletion>,
    ) -> StoreResult<()> {
        self.pool.faults.check(FaultPoint::AioSubmit)?;
        let this = self.clone();
        let name = name.to_string();
        self.pool.finisher.spawn_blocking(move || {
            let rc = this.write(&name, &data, offset).map(|()| 0);
            completion.complete(rc, Bytes::new());
        });
        Ok(())
    }

    fn aio_read(
        &self,
        name: &str,
        len: usize,
        offset: u64,
        completion: Arc<AioCompletion>,
    ) -> StoreResult<()> {
        self.pool.faults.check(FaultPoint::AioSubmit)?;
        let this = self.clone();
        let name = name.to_string();
        self.pool.finisher.spawn_blocking(move || match this.read(&name, len, offset) {
            Ok(data) => {
                completion.complete(Ok(data.len()), data);
            }
            Err(e) => {
                completion.complete(Err(e), Bytes::new());
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn striper(driver: &MemDriver, sc: u32, su: u64, os: u64) -> Box<dyn Striper> {
        let cluster = driver.init("admin").unwrap();
        cluster.connect().unwrap();
        let pool = cluster.open_pool(DEFAULT_POOL).unwrap();
        let mut s = pool.create_striper().unwrap();
        s.set_stripe_count(sc).unwrap();
        s.set_stripe_unit(su).unwrap();
        s.set_object_size(os).unwrap();
        s
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_write_read_across_objects() {
        let driver = MemDriver::new().unwrap();
        let s = striper(&driver, 3, STRIPE_UNIT_ALIGN, 2 * STRIPE_UNIT_ALIGN);
        let data = pattern(7 * STRIPE_UNIT_ALIGN as usize + 123);
        s.write("f", &data, 0).unwrap();

        assert_eq!(s.stat("f").unwrap().size, data.len() as u64);
        assert_eq!(s.read("f", data.len(), 0).unwrap(), data);
        // short read at end of file
        let tail = s.read("f", 1000, data.len() as u64 - 10).unwrap();
        assert_eq!(&tail[..], &data[data.len() - 10..]);
        assert!(s.read("f", 10, data.len() as u64 + 5).unwrap().is_empty());

        let keys = driver.object_keys(DEFAULT_POOL);
        assert_eq!(keys.len(), 5);
        assert!(keys.contains(&"f.0000000000000000".to_string()));
        assert!(keys.contains(&"f.0000000000000004".to_string()));
    }

    #[test]
    fn test_holes_read_as_zero() {
        let driver = MemDriver::new().unwrap();
        let s = striper(&driver, 2, STRIPE_UNIT_ALIGN, STRIPE_UNIT_ALIGN);
        s.write("h", b"xyz", 3 * STRIPE_UNIT_ALIGN).unwrap();
        let out = s.read("h", 10, 3 * STRIPE_UNIT_ALIGN - 7).unwrap();
        assert_eq!(&out[..], b"\0\0\0\0\0\0\0xyz");
    }

    #[test]
    fn test_missing_file() {
        let driver = MemDriver::new().unwrap();
        let s = striper(&driver, 1, STRIPE_UNIT_ALIGN, STRIPE_UNIT_ALIGN);
        assert_eq!(s.stat("nope").unwrap_err(), Errno::ENOENT);
        assert_eq!(s.read("nope", 1, 0).unwrap_err(), Errno::ENOENT);
        assert_eq!(s.trunc("nope", 0).unwrap_err(), Errno::ENOENT);
        assert_eq!(s.remove("nope").unwrap_err(), Errno::ENOENT);
        assert_eq!(s.getxattr("nope", "a").unwrap_err(), Errno::ENOENT);
    }

    #[test]
    fn test_trunc_and_remove() {
        let driver = MemDriver::new().unwrap();
        let su = STRIPE_UNIT_ALIGN;
        let s = striper(&driver, 2, su, su);
        let data = pattern(4 * su as usize);
        s.write("t", &data, 0).unwrap();
        assert_eq!(driver.object_keys(DEFAULT_POOL).len(), 4);

        s.trunc("t", su + 5).unwrap();
        assert_eq!(s.stat("t").unwrap().size, su + 5);
        assert_eq!(driver.object_keys(DEFAULT_POOL).len(), 2);
        assert_eq!(s.read("t", data.len(), 0).unwrap(), &data[..su as usize + 5]);

        // growing again exposes zeroes, not the old bytes
        s.trunc("t", 2 * su).unwrap();
        let out = s.read("t", 2 * su as usize, 0).unwrap();
        assert!(out[su as usize + 5..].iter().all(|&b| b == 0));

        s.remove("t").unwrap();
        assert!(driver.object_keys(DEFAULT_POOL).is_empty());
    }

    #[test]
    fn test_wide_object_set_removes() {
        let driver = MemDriver::new().unwrap();
        let su = STRIPE_UNIT_ALIGN;
        let s = striper(&driver, 200_000, su, 1 << 63);
        s.write("w", &pattern(2 * su as usize + 1), 0).unwrap();
        assert_eq!(driver.object_keys(DEFAULT_POOL).len(), 3);
        s.trunc("w", 1).unwrap();
        assert_eq!(driver.object_keys(DEFAULT_POOL).len(), 1);
        s.remove("w").unwrap();
        assert!(driver.object_keys(DEFAULT_POOL).is_empty());
    }

    #[test]
    fn test_xattrs() {
        let driver = MemDriver::new().unwrap();
        let s = striper(&driver, 1, STRIPE_UNIT_ALIGN, STRIPE_UNIT_ALIGN);
        s.write("x", b"", 0).unwrap();
        s.setxattr("x", "user.a", b"1").unwrap();
        s.setxattr("x", "user.bb", b"22").unwrap();
        assert_eq!(s.getxattr("x", "user.bb").unwrap(), Bytes::from_static(b"22"));
        assert_eq!(s.getxattrs("x").unwrap().len(), 2);
        s.rmxattr("x", "user.a").unwrap();
        assert_eq!(s.rmxattr("x", "user.a").unwrap_err(), Errno::ENODATA);
        assert_eq!(s.getxattr("x", "user.a").unwrap_err(), Errno::ENODATA);
    }

    #[test]
    fn test_layout_validation() {
        let driver = MemDriver::new().unwrap();
        let cluster = driver.init("admin").unwrap();
        cluster.connect().unwrap();
        let mut s = cluster.open_pool(DEFAULT_POOL).unwrap().create_striper().unwrap();
        assert_eq!(s.set_stripe_count(0).unwrap_err(), Errno::EINVAL);
        assert_eq!(s.set_stripe_unit(1000).unwrap_err(), Errno::EINVAL);
        s.set_stripe_unit(2 * STRIPE_UNIT_ALIGN).unwrap();
        assert_eq!(s.set_object_size(3 * STRIPE_UNIT_ALIGN).unwrap_err(), Errno::EINVAL);
        s.set_object_size(4 * STRIPE_UNIT_ALIGN).unwrap();
    }

    #[test]
    fn test_cluster_lifecycle() {
        let driver = MemDriver::new().unwrap();
        let cluster = driver.init("admin").unwrap();
        assert_eq!(cluster.open_pool(DEFAULT_POOL).err(), Some(Errno::ENOTCONN));
        cluster.connect().unwrap();
        assert_eq!(driver.live_clusters(), 1);
        assert_eq!(cluster.open_pool("missing").err(), Some(Errno::ENOENT));
        cluster.shutdown();
        assert_eq!(driver.live_clusters(), 0);
        assert_eq!(cluster.connect().unwrap_err(), Errno::ESHUTDOWN);

        driver.inject(FaultPoint::Connect, Errno::ETIMEDOUT);
        let other = driver.init("admin").unwrap();
        assert_eq!(other.connect().unwrap_err(), Errno::ETIMEDOUT);
        assert_eq!(driver.live_clusters(), 0);
    }

    #[test]
    fn test_aio_completes_on_finisher() {
        let driver = MemDriver::new().unwrap();
        let s = striper(&driver, 1, STRIPE_UNIT_ALIGN, STRIPE_UNIT_ALIGN);
        let (tx, rx) = mpsc::channel();
        let c = AioCompletion::new(move |rc, _| {
            let thread = std::thread::current().name().map(str::to_string);
            tx.send((rc, thread)).unwrap();
        });
        s.aio_write("a", Bytes::from_static(b"hello"), 0, c).unwrap();
        let (rc, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(rc, Ok(0));
        assert_eq!(thread.as_deref(), Some("mem-finisher"));

        let (tx, rx) = mpsc::channel();
        let c = AioCompletion::new(move |rc, data| tx.send((rc, data)).unwrap());
        s.aio_read("a", 5, 0, c).unwrap();
        let (rc, data) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(rc, Ok(5));
        assert_eq!(data, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_cluster_stat() {
        let driver = MemDriver::with_capacity(1024).unwrap();
        let s = striper(&driver, 1, STRIPE_UNIT_ALIGN, STRIPE_UNIT_ALIGN);
        s.write("big", &vec![1u8; 2048], 0).unwrap();
        let cluster = driver.init("admin").unwrap();
        cluster.connect().unwrap();
        let st = cluster.cluster_stat().unwrap();
        assert_eq!(st.kb, 1024);
        assert_eq!(st.kb_used, 2);
        assert_eq!(st.kb_avail, 1022);
        assert_eq!(st.num_objects, 1);
    }
}
