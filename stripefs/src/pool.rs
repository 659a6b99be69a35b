//! Resource pool: the process cluster connection plus one pool binding and
//! striping session per layout-equivalence key.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::params::Layout;
use crate::store::{Cluster, ClusterDriver, PoolIo, Striper};
use crate::sync::lock;

/// A pool binding with its configured striping session.
pub struct Session {
    key: String,
    pool: Arc<dyn PoolIo>,
    striper: Arc<dyn Striper>,
}

impl Session {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn pool(&self) -> &Arc<dyn PoolIo> {
        &self.pool
    }

    pub fn striper(&self) -> &dyn Striper {
        self.striper.as_ref()
    }
}

pub type SessionHandle = Arc<Session>;

#[derive(Default)]
struct PoolState {
    cluster: Option<Arc<dyn Cluster>>,
    sessions: HashMap<String, SessionHandle>,
}

pub struct SessionPool {
    driver: Arc<dyn ClusterDriver>,
    conf_file: Option<PathBuf>,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(driver: Arc<dyn ClusterDriver>, conf_file: Option<PathBuf>) -> Self {
        Self {
            driver,
            conf_file,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Returns the session for `layout`, creating it (and the cluster
    /// connection, on first use) if needed. A hit returns the pooled session
    /// untouched.
    pub fn acquire(&self, layout: &Layout) -> Result<SessionHandle> {
        let key = layout.key();
        let mut state = lock(&self.state);
        if let Some(session) = state.sessions.get(&key) {
            return Ok(session.clone());
        }

        let (cluster, fresh) = match &state.cluster {
            Some(cluster) => (cluster.clone(), false),
            None => (self.connect(&layout.user_id)?, true),
        };
        match Self::create_session(cluster.as_ref(), key.clone(), layout) {
            Ok(session) => {
                if fresh {
                    state.cluster = Some(cluster);
                }
                debug!(key = %key, "created striping session");
                state.sessions.insert(key, session.clone());
                Ok(session)
            }
            Err(e) => {
                if fresh {
                    cluster.shutdown();
                }
                Err(e)
            }
        }
    }

    fn connect(&self, user_id: &str) -> Result<Arc<dyn Cluster>> {
        let unavailable = |step: &'static str| {
            move |source| {
                warn!(user = %user_id, "cluster {step} failed: {source}");
                Error::ClusterUnavailable { step, source }
            }
        };
        let cluster = self.driver.init(user_id).map_err(unavailable("init"))?;
        let steps = || -> Result<()> {
            cluster
                .conf_read_file(self.conf_file.as_deref())
                .map_err(unavailable("read configuration"))?;
            cluster
                .conf_parse_env()
                .map_err(unavailable("parse environment"))?;
            cluster.connect().map_err(unavailable("connect"))
        };
        if let Err(e) = steps() {
            cluster.shutdown();
            return Err(e);
        }
        info!(user = %user_id, "connected to cluster");
        Ok(cluster)
    }

    fn create_session(cluster: &dyn Cluster, key: String, layout: &Layout) -> Result<SessionHandle> {
        let pool = cluster
            .open_pool(&layout.pool)
            .map_err(|source| Error::PoolUnavailable {
                pool: layout.pool.clone(),
                source,
            })?;
        let mut striper = pool.create_striper()?;
        striper.set_stripe_count(layout.stripe_count).map_err(|e| {
            warn!("invalid stripe count {}: {e}", layout.stripe_count);
            Error::InvalidLayout(format!("stripe count {}: {e}", layout.stripe_count))
        })?;
        striper.set_stripe_unit(layout.stripe_unit).map_err(|e| {
            warn!(
                "invalid stripe unit {} (must be non 0, multiple of 64K): {e}",
                layout.stripe_unit
            );
            Error::InvalidLayout(format!("stripe unit {}: {e}", layout.stripe_unit))
        })?;
        striper.set_object_size(layout.object_size).map_err(|e| {
            warn!(
                "invalid object size {} (must be non 0, multiple of stripe unit): {e}",
                layout.object_size
            );
            Error::InvalidLayout(format!("object size {}: {e}", layout.object_size))
        })?;
        Ok(Arc::new(Session {
            key,
            pool,
            striper: Arc::from(striper),
        }))
    }

    /// The process cluster connection, if one is established.
    pub fn cluster(&self) -> Option<Arc<dyn Cluster>> {
        lock(&self.state).cluster.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session and shuts the cluster connection down. Safe to
    /// call on an empty pool.
    pub fn release_all(&self) {
        let (sessions, cluster) = {
            let mut state = lock(&self.state);
            (
                std::mem::take(&mut state.sessions),
                state.cluster.take(),
            )
        };
        let released = sessions.len();
        drop(sessions);
        if let Some(cluster) = cluster {
            cluster.shutdown();
            info!(sessions = released, "disconnected from cluster");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::{FaultPoint, MemDriver};
    use nix::errno::Errno;

    fn layout(pool: &str, sc: u32, su: u64, os: u64) -> Layout {
        Layout {
            user_id: "admin".to_string(),
            pool: pool.to_string(),
            stripe_count: sc,
            stripe_unit: su,
            object_size: os,
        }
    }

    fn pool() -> (MemDriver, SessionPool) {
        let driver = MemDriver::new().unwrap();
        driver.create_pool("other");
        let pool = SessionPool::new(Arc::new(driver.clone()), None);
        (driver, pool)
    }

    #[test]
    fn test_same_layout_same_session() {
        let (driver, pool) = pool();
        let a = pool.acquire(&layout("default", 2, 65536, 131072)).unwrap();
        let b = pool.acquire(&layout("default", 2, 65536, 131072)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
        assert_eq!(driver.inits(), 1);
    }

    #[test]
    fn test_different_pool_distinct_session() {
        let (driver, pool) = pool();
        let a = pool.acquire(&layout("default", 1, 65536, 65536)).unwrap();
        let b = pool.acquire(&layout("other", 1, 65536, 65536)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.pool().name(), "other");
        assert_eq!(pool.len(), 2);
        // one cluster connection serves every session
        assert_eq!(driver.inits(), 1);
        assert_eq!(driver.live_clusters(), 1);
    }

    #[test]
    fn test_connect_failure_leaves_nothing() {
        let (driver, pool) = pool();
        driver.inject(FaultPoint::ConfReadFile, Errno::ENOENT);
        let err = pool.acquire(&Layout::default()).err().unwrap();
        assert_eq!(
            err,
            Error::ClusterUnavailable {
                step: "read configuration",
                source: Errno::ENOENT
            }
        );
        assert!(pool.cluster().is_none());
        assert!(pool.is_empty());

        driver.clear_faults();
        driver.inject(FaultPoint::Connect, Errno::ETIMEDOUT);
        assert!(pool.acquire(&Layout::default()).is_err());
        assert_eq!(driver.live_clusters(), 0);

        driver.clear_faults();
        pool.acquire(&Layout::default()).unwrap();
        assert!(pool.cluster().is_some());
    }

    #[test]
    fn test_bad_layout_on_first_session_drops_cluster() {
        let (driver, pool) = pool();
        let err = pool.acquire(&layout("default", 1, 1000, 1000)).err().unwrap();
        assert!(matches!(err, Error::InvalidLayout(_)));
        assert!(pool.cluster().is_none());
        assert_eq!(driver.live_clusters(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_bad_layout_later_keeps_cluster() {
        let (driver, pool) = pool();
        let good = pool.acquire(&Layout::default()).unwrap();
        let err = pool.acquire(&layout("default", 0, 65536, 65536)).err().unwrap();
        assert!(matches!(err, Error::InvalidLayout(_)));
        let err = pool.acquire(&layout("default", 1, 65536, 100_000)).err().unwrap();
        assert!(matches!(err, Error::InvalidLayout(_)));
        assert_eq!(driver.live_clusters(), 1);
        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&good, &pool.acquire(&Layout::default()).unwrap()));
    }

    #[test]
    fn test_missing_pool() {
        let (driver, pool) = pool();
        let err = pool.acquire(&layout("nope", 1, 65536, 65536)).err().unwrap();
        assert_eq!(err.errno(), Errno::ENOENT);
        assert!(matches!(err, Error::PoolUnavailable { .. }));
        assert_eq!(driver.live_clusters(), 0);
    }

    #[test]
    fn test_release_all_is_idempotent() {
        let (driver, pool) = pool();
        pool.release_all();
        pool.acquire(&Layout::default()).unwrap();
        pool.acquire(&layout("other", 1, 65536, 65536)).unwrap();
        pool.release_all();
        assert!(pool.is_empty());
        assert!(pool.cluster().is_none());
        assert_eq!(driver.live_clusters(), 0);
        pool.release_all();

        // a later acquire reconnects
        pool.acquire(&Layout::default()).unwrap();
        assert_eq!(driver.inits(), 2);
    }
}
