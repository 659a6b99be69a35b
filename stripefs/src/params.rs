//! Path and parameter parsing.
//!
//! A path has the shape
//! `[[user@]pool[,stripeCount[,stripeUnit[,objectSize]]]:]name`. Every layout
//! field missing from the path is looked up in the ambient [`Env`] and then
//! taken from the process default [`Layout`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const DEFAULT_USER_ID: &str = "admin";
pub const DEFAULT_POOL: &str = "default";
pub const DEFAULT_STRIPE_COUNT: u32 = 1;
pub const DEFAULT_STRIPE_UNIT: u64 = 4 * 1024 * 1024;
pub const DEFAULT_OBJECT_SIZE: u64 = 4 * 1024 * 1024;

pub const ENV_USER_ID: &str = "cephUserId";
pub const ENV_POOL: &str = "cephPool";
pub const ENV_STRIPE_COUNT: &str = "cephNbStripes";
pub const ENV_STRIPE_UNIT: &str = "cephStripeUnit";
pub const ENV_OBJECT_SIZE: &str = "cephObjectSize";

/// Everything of a file identity but its name. Two identities with equal
/// layouts share one pooled session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub user_id: String,
    pub pool: String,
    pub stripe_count: u32,
    pub stripe_unit: u64,
    pub object_size: u64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID.to_string(),
            pool: DEFAULT_POOL.to_string(),
            stripe_count: DEFAULT_STRIPE_COUNT,
            stripe_unit: DEFAULT_STRIPE_UNIT,
            object_size: DEFAULT_OBJECT_SIZE,
        }
    }
}

/// Serializes as `user@pool,count,unit,size`, which parses back to the same
/// layout.
impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{},{},{},{}",
            self.user_id, self.pool, self.stripe_count, self.stripe_unit, self.object_size
        )
    }
}

impl FromStr for Layout {
    type Err = Error;

    /// Parses a default-layout string (`user@pool,count,unit,size`, no name),
    /// filling absent pieces from the built-in defaults.
    fn from_str(s: &str) -> Result<Self> {
        Layout::parse(s, None, &Layout::default())
    }
}

impl Layout {
    /// Layout-equivalence key of the resource pool.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Parses the parameter portion of a path (everything before the colon).
    pub fn parse(params: &str, env: Option<&Env>, defaults: &Layout) -> Result<Self> {
        let (user, rest) = match params.find('@') {
            Some(at) => (Some(&params[..at]), &params[at + 1..]),
            None => (None, params),
        };
        // The object size takes whatever is left after the third comma, so
        // trailing garbage shows up as an invalid number rather than vanishing.
        let mut pieces = rest.splitn(4, ',');
        let pool = pieces.next();
        let stripe_count = pieces.next();
        let stripe_unit = pieces.next();
        let object_size = pieces.next();

        Ok(Self {
            user_id: match pick(user, env, ENV_USER_ID) {
                Some(v) => check_name("user id", v, &['@', ':'])?,
                None => defaults.user_id.clone(),
            },
            pool: match pick(pool, env, ENV_POOL) {
                Some(v) => check_name("pool", v, &[',', ':'])?,
                None => defaults.pool.clone(),
            },
            stripe_count: match pick(stripe_count, env, ENV_STRIPE_COUNT) {
                Some(v) => parse_number("stripe count", v)?,
                None => defaults.stripe_count,
            },
            stripe_unit: match pick(stripe_unit, env, ENV_STRIPE_UNIT) {
                Some(v) => parse_number("stripe unit", v)?,
                None => defaults.stripe_unit,
            },
            object_size: match pick(object_size, env, ENV_OBJECT_SIZE) {
                Some(v) => parse_number("object size", v)?,
                None => defaults.object_size,
            },
        })
    }
}

fn pick<'a>(piece: Option<&'a str>, env: Option<&'a Env>, key: &str) -> Option<&'a str> {
    piece
        .filter(|p| !p.is_empty())
        .or_else(|| env.and_then(|env| env.get(key)))
        .filter(|v| !v.is_empty())
}

/// Env values may hold separators a path piece cannot; those would not
/// survive a round trip through the layout key.
fn check_name(field: &str, value: &str, separators: &[char]) -> Result<String> {
    if value.contains(separators) {
        return Err(Error::InvalidLayout(format!(
            "{field} '{value}' contains a path separator"
        )));
    }
    Ok(value.to_string())
}

fn parse_number<T>(field: &str, value: &str) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    value
        .parse::<T>()
        .map_err(|e| Error::InvalidLayout(format!("{field} '{value}': {e}")))
}

/// Fully resolved identity of a logical file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub name: String,
    pub layout: Layout,
}

impl FileIdentity {
    pub fn resolve(path: &str, env: Option<&Env>, defaults: &Layout) -> Result<Self> {
        let (params, name) = match path.find(':') {
            Some(colon) => (&path[..colon], &path[colon + 1..]),
            None => ("", path),
        };
        Ok(Self {
            name: name.to_string(),
            layout: Layout::parse(params, env, defaults)?,
        })
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.layout, self.name)
    }
}

/// Ambient key/value environment handed over by the embedding framework.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an opaque `&key=value&key2=value2` string. Pieces without `=`
    /// are ignored.
    pub fn parse_cgi(opaque: &str) -> Self {
        opaque
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str, env: Option<&Env>) -> Result<FileIdentity> {
        FileIdentity::resolve(path, env, &Layout::default())
    }

    #[test]
    fn test_full_path() {
        let id = resolve("alice@poolA,3,65536,262144:data/run1", None).unwrap();
        assert_eq!(id.name, "data/run1");
        assert_eq!(id.layout.user_id, "alice");
        assert_eq!(id.layout.pool, "poolA");
        assert_eq!(id.layout.stripe_count, 3);
        assert_eq!(id.layout.stripe_unit, 65536);
        assert_eq!(id.layout.object_size, 262144);
    }

    #[test]
    fn test_bare_name_uses_defaults() {
        let defaults: Layout = "bob@scratch,2,131072,262144".parse().unwrap();
        let id = FileIdentity::resolve("data/run1", None, &defaults).unwrap();
        assert_eq!(id.name, "data/run1");
        assert_eq!(id.layout, defaults);
    }

    #[test]
    fn test_partial_params() {
        let id = resolve("poolB:f", None).unwrap();
        assert_eq!(id.layout.pool, "poolB");
        assert_eq!(id.layout.user_id, DEFAULT_USER_ID);
        assert_eq!(id.layout.stripe_count, DEFAULT_STRIPE_COUNT);

        let id = resolve("poolB,4:f", None).unwrap();
        assert_eq!(id.layout.stripe_count, 4);
        assert_eq!(id.layout.stripe_unit, DEFAULT_STRIPE_UNIT);

        let id = resolve(":/", None).unwrap();
        assert_eq!(id.name, "/");
        assert_eq!(id.layout, Layout::default());
    }

    #[test]
    fn test_env_fills_missing_fields() {
        let env = Env::new()
            .with(ENV_USER_ID, "carol")
            .with(ENV_POOL, "envpool")
            .with(ENV_STRIPE_COUNT, "5")
            .with(ENV_STRIPE_UNIT, "131072")
            .with(ENV_OBJECT_SIZE, "524288");
        let id = resolve("file", Some(&env)).unwrap();
        assert_eq!(id.layout.user_id, "carol");
        assert_eq!(id.layout.pool, "envpool");
        assert_eq!(id.layout.stripe_count, 5);
        assert_eq!(id.layout.stripe_unit, 131072);
        assert_eq!(id.layout.object_size, 524288);

        // path wins over env
        let id = resolve("dave@p,2:file", Some(&env)).unwrap();
        assert_eq!(id.layout.user_id, "dave");
        assert_eq!(id.layout.pool, "p");
        assert_eq!(id.layout.stripe_count, 2);
        assert_eq!(id.layout.stripe_unit, 131072);
    }

    #[test]
    fn test_empty_pieces_fall_back() {
        let env = Env::new().with(ENV_STRIPE_COUNT, "7");
        let id = resolve("@p,,65536:f", Some(&env)).unwrap();
        assert_eq!(id.layout.user_id, DEFAULT_USER_ID);
        assert_eq!(id.layout.stripe_count, 7);
        assert_eq!(id.layout.stripe_unit, 65536);
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            resolve("p,abc:f", None),
            Err(Error::InvalidLayout(_))
        ));
        assert!(matches!(
            resolve("p,4294967296:f", None),
            Err(Error::InvalidLayout(_))
        ));
        assert_eq!(resolve("p,4294967295:f", None).unwrap().layout.stripe_count, u32::MAX);
        assert!(matches!(
            resolve("p,1,18446744073709551616:f", None),
            Err(Error::InvalidLayout(_))
        ));
        assert!(matches!(
            resolve("p,1,65536,65536,9:f", None),
            Err(Error::InvalidLayout(_))
        ));
        let env = Env::new().with(ENV_OBJECT_SIZE, "lots");
        assert!(matches!(
            resolve("f", Some(&env)),
            Err(Error::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_name_keeps_later_colons() {
        let id = resolve("p:a:b", None).unwrap();
        assert_eq!(id.layout.pool, "p");
        assert_eq!(id.name, "a:b");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let env = Env::new().with(ENV_POOL, "envpool");
        for path in [
            "alice@poolA,3,65536,262144:data/run1",
            "data/run1",
            "poolB,2:x",
            "@,,131072:y",
            ":/",
        ] {
            let first = resolve(path, Some(&env)).unwrap();
            let again = resolve(&first.to_string(), None).unwrap();
            assert_eq!(first, again, "path {path}");
        }
    }

    #[test]
    fn test_env_names_with_separators() {
        for env in [
            Env::new().with(ENV_POOL, "a,b"),
            Env::new().with(ENV_POOL, "a:b"),
            Env::new().with(ENV_USER_ID, "u@v"),
            Env::new().with(ENV_USER_ID, "u:v"),
        ] {
            assert!(matches!(
                resolve("f", Some(&env)),
                Err(Error::InvalidLayout(_))
            ));
        }
        // an '@' inside a pool and a ',' inside a user survive the key
        let env = Env::new().with(ENV_POOL, "p@q").with(ENV_USER_ID, "u,v");
        let first = resolve("f", Some(&env)).unwrap();
        assert_eq!(first.layout.key(), "u,v@p@q,1,4194304,4194304");
        assert_eq!(resolve(&first.to_string(), None).unwrap(), first);
    }

    #[test]
    fn test_parse_cgi() {
        let env = Env::parse_cgi("&cephPool=fast&cephNbStripes=2&junk&=x");
        assert_eq!(env.get(ENV_POOL), Some("fast"));
        assert_eq!(env.get(ENV_STRIPE_COUNT), Some("2"));
        assert_eq!(env.get("junk"), None);
    }
}
