//! Descriptor table: synthetic handles over open logical files.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::error::{Error, Result};
use crate::params::FileIdentity;

pub type Fd = u32;

/// Handles stay representable as non-negative return codes.
pub const MAX_FD: Fd = i32::MAX as Fd;

/// State behind one live descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub identity: FileIdentity,
    pub flags: OFlag,
    pub mode: Mode,
    /// Only the sequential read/write entry points move it.
    pub cursor: i64,
}

impl OpenFile {
    pub fn new(identity: FileIdentity, flags: OFlag, mode: Mode) -> Self {
        Self {
            identity,
            flags,
            mode,
            cursor: 0,
        }
    }

    pub fn is_writable(&self) -> bool {
        is_write_mode(self.flags)
    }

    /// Write-only descriptors are the only ones that cannot read.
    pub fn is_readable(&self) -> bool {
        !self.flags.contains(OFlag::O_WRONLY)
    }
}

pub fn is_write_mode(flags: OFlag) -> bool {
    flags.intersects(OFlag::O_WRONLY | OFlag::O_RDWR)
}

/// Multiset of names currently open for writing.
#[derive(Debug, Default)]
pub struct WriteIntents {
    counts: HashMap<String, usize>,
}

impl WriteIntents {
    pub fn insert(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_default() += 1;
    }

    /// Removes one occurrence of `name`.
    pub fn remove(&mut self, name: &str) {
        if let Entry::Occupied(mut e) = self.counts.entry(name.to_string()) {
            *e.get_mut() -= 1;
            if *e.get() == 0 {
                e.remove();
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }
}

/// Handles are handed out in increasing order and never reused.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    files: HashMap<Fd, OpenFile>,
    next: Fd,
    intents: WriteIntents,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: OpenFile) -> Result<Fd> {
        if self.next > MAX_FD {
            return Err(Error::DescriptorsExhausted);
        }
        let fd = self.next;
        self.next += 1;
        if file.is_writable() {
            self.intents.insert(&file.identity.name);
        }
        self.files.insert(fd, file);
        Ok(fd)
    }

    pub fn remove(&mut self, fd: Fd) -> Result<OpenFile> {
        let file = self.files.remove(&fd).ok_or(Error::BadDescriptor(fd))?;
        if file.is_writable() {
            self.intents.remove(&file.identity.name);
        }
        Ok(file)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.files.get(&fd).ok_or(Error::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))
    }

    pub fn intents(&self) -> &WriteIntents {
        &self.intents
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn set_next(&mut self, next: Fd) {
        self.next = next;
    }
}
