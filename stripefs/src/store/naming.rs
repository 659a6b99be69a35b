//! Physical naming of striped files.

use std::fmt::Debug;

/// Maps a logical file onto physical object keys.
pub trait StripeNaming: Send + Sync + Debug {
    /// Key of object number `object_no` of logical file `name`.
    fn object_key(&self, name: &str, object_no: u64) -> String;

    /// If `key` is the first-stripe object of a logical file, the file's name.
    fn logical_name<'a>(&self, key: &'a str) -> Option<&'a str>;
}

/// `<name>.<object number as 16 hex digits>`; object zero marks the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RadosStriperNaming;

impl RadosStriperNaming {
    pub const FIRST_STRIPE_SUFFIX: &'static str = ".0000000000000000";
}

impl StripeNaming for RadosStriperNaming {
    fn object_key(&self, name: &str, object_no: u64) -> String {
        format!("{name}.{object_no:016x}")
    }

    fn logical_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_suffix(Self::FIRST_STRIPE_SUFFIX)
    }
}
