//! Typed accessors over the string-typed parameter bag that arrives from
//! a `StorageClass`. Reframes the raw `HashMap<String, String>` into
//! explicit accessors so malformed shapes are rejected at the
//! filter-chain boundary rather than deep inside a plugin.

use std::collections::HashMap;
use std::str::FromStr;

/// A thin, borrowing wrapper over a `StorageClass`/request parameter map.
#[derive(Debug, Clone, Copy)]
pub struct ParamBag<'a>(&'a HashMap<String, String>);

impl<'a> ParamBag<'a> {
    #[must_use]
    pub fn new(map: &'a HashMap<String, String>) -> Self {
        Self(map)
    }

    /// Raw string value, or `""` if absent — an empty string means "don't
    /// filter" throughout the filter chain.
    #[must_use]
    pub fn get_str(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or_default()
    }

    /// `true`/`false`, defaulting to `false` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error string if the key is present but isn't exactly
    /// `"true"` or `"false"`.
    pub fn get_bool(&self, key: &str) -> Result<bool, String> {
        match self.0.get(key).map(String::as_str) {
            None | Some("") => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(format!("parameter '{key}' must be 'true' or 'false', got '{other}'")),
        }
    }

    /// Parse the value at `key` as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error string if the key is absent or doesn't parse.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, String> {
        let raw = self.0.get(key).ok_or_else(|| format!("parameter '{key}' is missing"))?;
        serde_json::from_str(raw).map_err(|e| format!("parameter '{key}' is not valid json: {e}"))
    }

    /// Parse the value at `key` via `FromStr`, if present.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn as_map(&self) -> &HashMap<String, String> {
        self.0
    }
}

/// Translate the node-publish mount flag `nfsvers=X` into the
/// `nfsProtocol` `StorageClass` parameter value.
#[must_use]
pub fn nfs_protocol_from_mount_flag(nfsvers: &str) -> Option<&'static str> {
    match nfsvers {
        "3" => Some("nfs3"),
        "4" | "4.0" => Some("nfs4"),
        "4.1" => Some("nfs41"),
        "4.2" => Some("nfs42"),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_means_dont_filter() {
        let mut map = HashMap::new();
        map.insert("qos".to_owned(), String::new());
        let bag = ParamBag::new(&map);
        assert_eq!(bag.get_str("qos"), "");
        assert_eq!(bag.get_str("missing"), "");
    }

    #[test]
    fn bool_rejects_non_canonical_values() {
        let mut map = HashMap::new();
        map.insert("hyperMetro".to_owned(), "yes".to_owned());
        let bag = ParamBag::new(&map);
        assert!(bag.get_bool("hyperMetro").is_err());
    }

    #[test]
    fn nfsvers_translation_matches_table() {
        assert_eq!(nfs_protocol_from_mount_flag("3"), Some("nfs3"));
        assert_eq!(nfs_protocol_from_mount_flag("4"), Some("nfs4"));
        assert_eq!(nfs_protocol_from_mount_flag("4.0"), Some("nfs4"));
        assert_eq!(nfs_protocol_from_mount_flag("4.1"), Some("nfs41"));
        assert_eq!(nfs_protocol_from_mount_flag("4.2"), Some("nfs42"));
        assert_eq!(nfs_protocol_from_mount_flag("2"), None);
    }
}
