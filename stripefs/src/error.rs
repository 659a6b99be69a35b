use nix::errno::Errno;
use thiserror::Error;

use crate::fd::Fd;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Bad file descriptor: {0}")]
    BadDescriptor(Fd),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Cluster unavailable ({step}): {source}")]
    ClusterUnavailable { step: &'static str, source: Errno },

    #[error("Cannot bind pool {pool}: {source}")]
    PoolUnavailable { pool: String, source: Errno },

    #[error("No descriptor left to allocate")]
    DescriptorsExhausted,

    #[error(transparent)]
    Store(#[from] Errno),
}

impl Error {
    /// The errno this failure is reported as at the POSIX boundary.
    pub fn errno(&self) -> Errno {
        match self {
            Error::InvalidLayout(_) | Error::InvalidArgument(_) => Errno::EINVAL,
            Error::BadDescriptor(_) => Errno::EBADF,
            Error::NotFound(_) => Errno::ENOENT,
            Error::AlreadyExists(_) => Errno::EEXIST,
            Error::ClusterUnavailable { source, .. } | Error::PoolUnavailable { source, .. } => {
                *source
            }
            Error::DescriptorsExhausted => Errno::EMFILE,
            Error::Store(errno) => *errno,
        }
    }

    /// Negative `-errno` return code.
    pub fn rc(&self) -> i64 {
        -(self.errno() as i64)
    }

    pub fn is_not_found(&self) -> bool {
        self.errno() == Errno::ENOENT
    }
}

/// Conversion of an operation result into the signed return-code convention
/// used by the embedding framework: a non-negative value is success, a
/// negative one is `-errno`.
pub trait ReturnCode {
    fn rc(self) -> i64;
}

fn failure_rc(err: &Error) -> i64 {
    if let Error::InvalidLayout(msg) = err {
        tracing::warn!("invalid syntax in file parameters: {msg}");
    }
    err.rc()
}

impl ReturnCode for Result<()> {
    fn rc(self) -> i64 {
        match self {
            Ok(()) => 0,
            Err(e) => failure_rc(&e),
        }
    }
}

impl ReturnCode for Result<usize> {
    fn rc(self) -> i64 {
        match self {
            Ok(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Err(e) => failure_rc(&e),
        }
    }
}

impl ReturnCode for Result<i64> {
    fn rc(self) -> i64 {
        match self {
            Ok(n) => n,
            Err(e) => failure_rc(&e),
        }
    }
}

impl ReturnCode for Result<Fd> {
    fn rc(self) -> i64 {
        match self {
            Ok(fd) => i64::from(fd),
            Err(e) => failure_rc(&e),
        }
    }
}
