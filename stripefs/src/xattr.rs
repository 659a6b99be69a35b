//! Extended attributes of logical files, by path or by descriptor.

use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::fd::Fd;
use crate::fs::StripeFs;
use crate::params::{Env, FileIdentity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XattrEntry {
    pub name: String,
    pub value_len: usize,
}

/// Result of an attribute listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XattrList {
    /// Length of the largest value.
    pub max_value_len: usize,
    /// Empty for a [`ListMode::SizeOnly`] listing.
    pub entries: Vec<XattrEntry>,
}

/// A caller sizes its buffer with a `SizeOnly` pass, then fills it with a
/// `Full` one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListMode {
    SizeOnly,
    Full,
}

impl StripeFs {
    fn getxattr_identity(&self, identity: &FileIdentity, attr: &str) -> Result<Bytes> {
        let session = self.session(identity)?;
        Ok(session.striper().getxattr(&identity.name, attr)?)
    }

    fn setxattr_identity(&self, identity: &FileIdentity, attr: &str, value: &[u8]) -> Result<()> {
        let session = self.session(identity)?;
        Ok(session.striper().setxattr(&identity.name, attr, value)?)
    }

    fn removexattr_identity(&self, identity: &FileIdentity, attr: &str) -> Result<()> {
        let session = self.session(identity)?;
        Ok(session.striper().rmxattr(&identity.name, attr)?)
    }

    fn listxattr_identity(&self, identity: &FileIdentity, mode: ListMode) -> Result<XattrList> {
        let session = self.session(identity)?;
        let attrs = session.striper().getxattrs(&identity.name)?;
        let max_value_len = attrs.values().map(Bytes::len).max().unwrap_or(0);
        let entries = match mode {
            ListMode::SizeOnly => Vec::new(),
            ListMode::Full => attrs
                .into_iter()
                .map(|(name, value)| XattrEntry {
                    name,
                    value_len: value.len(),
                })
                .collect(),
        };
        Ok(XattrList {
            max_value_len,
            entries,
        })
    }

    pub fn getxattr(&self, env: Option<&Env>, path: &str, attr: &str) -> Result<Bytes> {
        debug!("getxattr: path {path} name={attr}");
        self.getxattr_identity(&self.resolve(env, path)?, attr)
    }

    pub fn fgetxattr(&self, fd: Fd, attr: &str) -> Result<Bytes> {
        let file = self.file(fd)?;
        debug!("fgetxattr: fd {fd} name={attr}");
        self.getxattr_identity(&file.identity, attr)
    }

    pub fn setxattr(&self, env: Option<&Env>, path: &str, attr: &str, value: &[u8]) -> Result<()> {
        debug!("setxattr: path {path} name={attr} value len {}", value.len());
        self.setxattr_identity(&self.resolve(env, path)?, attr, value)
    }

    pub fn fsetxattr(&self, fd: Fd, attr: &str, value: &[u8]) -> Result<()> {
        let file = self.file(fd)?;
        debug!("fsetxattr: fd {fd} name={attr} value len {}", value.len());
        self.setxattr_identity(&file.identity, attr, value)
    }

    pub fn removexattr(&self, env: Option<&Env>, path: &str, attr: &str) -> Result<()> {
        debug!("removexattr: path {path} name={attr}");
        self.removexattr_identity(&self.resolve(env, path)?, attr)
    }

    pub fn fremovexattr(&self, fd: Fd, attr: &str) -> Result<()> {
        let file = self.file(fd)?;
        debug!("fremovexattr: fd {fd} name={attr}");
        self.removexattr_identity(&file.identity, attr)
    }

    pub fn listxattr(&self, env: Option<&Env>, path: &str, mode: ListMode) -> Result<XattrList> {
        debug!("listxattr: path {path}");
        self.listxattr_identity(&self.resolve(env, path)?, mode)
    }

    pub fn flistxattr(&self, fd: Fd, mode: ListMode) -> Result<XattrList> {
        let file = self.file(fd)?;
        debug!("flistxattr: fd {fd}");
        self.listxattr_identity(&file.identity, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nix::errno::Errno;
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;

    use crate::config::Config;
    use crate::error::Error;
    use crate::store::mem::MemDriver;

    fn fs_with_file(name: &str) -> (StripeFs, Fd) {
        let driver = MemDriver::new().unwrap();
        let fs = StripeFs::new(&Config::default(), Arc::new(driver)).unwrap();
        let fd = fs
            .open(None, name, OFlag::O_RDWR | OFlag::O_CREAT, Mode::empty())
            .unwrap();
        fs.write(fd, b"payload").unwrap();
        (fs, fd)
    }

    #[test]
    fn test_path_and_descriptor_views_agree() {
        let (fs, fd) = fs_with_file("x");
        fs.setxattr(None, "x", "user.checksum", b"adler32:0badf00d").unwrap();
        fs.fsetxattr(fd, "user.owner", b"ops").unwrap();
        assert_eq!(
            fs.fgetxattr(fd, "user.checksum").unwrap(),
            Bytes::from_static(b"adler32:0badf00d")
        );
        assert_eq!(fs.getxattr(None, "x", "user.owner").unwrap(), Bytes::from_static(b"ops"));

        fs.removexattr(None, "x", "user.owner").unwrap();
        assert_eq!(
            fs.fremovexattr(fd, "user.owner").unwrap_err(),
            Error::Store(Errno::ENODATA)
        );
        assert_eq!(
            fs.getxattr(None, "x", "user.owner").unwrap_err(),
            Error::Store(Errno::ENODATA)
        );
    }

    #[test]
    fn test_list_modes() {
        let (fs, fd) = fs_with_file("l");
        fs.fsetxattr(fd, "a", b"1").unwrap();
        fs.fsetxattr(fd, "bb", b"4444").unwrap();

        let sized = fs.flistxattr(fd, ListMode::SizeOnly).unwrap();
        assert_eq!(sized.max_value_len, 4);
        assert!(sized.entries.is_empty());

        let mut full = fs.listxattr(None, "l", ListMode::Full).unwrap();
        full.entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(full.max_value_len, 4);
        assert_eq!(
            full.entries,
            vec![
                XattrEntry {
                    name: "a".to_string(),
                    value_len: 1
                },
                XattrEntry {
                    name: "bb".to_string(),
                    value_len: 4
                },
            ]
        );
    }

    #[test]
    fn test_missing_file_and_descriptor() {
        let (fs, fd) = fs_with_file("m");
        assert_eq!(
            fs.listxattr(None, "ghost", ListMode::Full).unwrap_err(),
            Error::Store(Errno::ENOENT)
        );
        fs.close(fd).unwrap();
        assert_eq!(fs.fgetxattr(fd, "a").unwrap_err(), Error::BadDescriptor(fd));
        assert_eq!(fs.flistxattr(fd, ListMode::Full).unwrap_err(), Error::BadDescriptor(fd));
    }
}
