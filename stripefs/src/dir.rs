//! Enumeration of the flat object namespace and cluster capacity.
//!
//! Only the root `/` can be opened. Listing it walks every physical object
//! of the root pool and keeps the first-stripe keys, so each logical file is
//! reported once however many objects back it.

use std::sync::Arc;

use nix::errno::Errno;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::StripeFs;
use crate::params::Env;
use crate::store::{ObjectCursor, PoolIo, StripeNaming};

pub const ROOT: &str = "/";

/// Open directory stream over the root pool.
pub struct DirCursor {
    pool: Arc<dyn PoolIo>,
    objects: ObjectCursor,
    naming: Arc<dyn StripeNaming>,
}

impl DirCursor {
    pub fn pool(&self) -> &str {
        self.pool.name()
    }

    /// The next logical name, or `None` at the end of the listing.
    pub fn next_name(&mut self) -> Option<String> {
        let naming = &self.naming;
        self.objects
            .by_ref()
            .find_map(|key| naming.logical_name(&key).map(str::to_string))
    }
}

impl Iterator for DirCursor {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_name()
    }
}

/// Cluster capacity in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsStat {
    pub total: u64,
    pub free: u64,
}

impl StripeFs {
    pub fn opendir(&self, env: Option<&Env>, path: &str) -> Result<DirCursor> {
        debug!("opendir: {path}");
        let identity = self.resolve(env, path)?;
        if identity.name != ROOT {
            return Err(Error::NotFound(path.to_string()));
        }
        let session = self.session(&identity)?;
        let pool = session.pool().clone();
        let objects = pool.list_objects()?;
        Ok(DirCursor {
            pool,
            objects,
            naming: self.naming.clone(),
        })
    }

    pub fn readdir(&self, dir: &mut DirCursor) -> Option<String> {
        dir.next_name()
    }

    pub fn closedir(&self, dir: DirCursor) {
        debug!("closedir: pool {}", dir.pool());
    }

    /// Connects through the default layout when no session exists yet.
    pub fn statfs(&self) -> Result<FsStat> {
        debug!("statfs");
        let cluster = match self.sessions.cluster() {
            Some(cluster) => cluster,
            None => {
                self.sessions.acquire(&self.defaults)?;
                self.sessions
                    .cluster()
                    .ok_or(Error::Store(Errno::ENOTCONN))?
            }
        };
        let stat = cluster.cluster_stat()?;
        Ok(FsStat {
            total: stat.kb.saturating_mul(1024),
            free: stat.kb_avail.saturating_mul(1024),
        })
    }
}
