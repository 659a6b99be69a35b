// Library crate for StripeFS: POSIX-style files over a striped object store.
// `StripeFs` is the process context; `store` holds the backing-store seam and
// its in-memory implementation.

pub mod aio;
pub mod config;
pub mod dir;
pub mod error;
pub mod fd;
pub mod fs;
pub mod logging;
pub mod params;
pub mod pool;
pub mod store;
mod sync;
pub mod xattr;

pub use aio::{AioCallback, AioResult};
pub use config::{Config, load_config};
pub use dir::{DirCursor, FsStat};
pub use error::{Error, Result, ReturnCode};
pub use fd::Fd;
pub use fs::{FileStat, StripeFs};
pub use params::{Env, FileIdentity, Layout};
pub use xattr::{ListMode, XattrEntry, XattrList};
