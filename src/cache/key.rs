//! Cache key derivation
//!
//! A command invocation is identified by its full argument vector. The key is
//! the JSON array encoding of that vector, so element boundaries are always
//! explicit: `["a","b c"]` and `["a","b","c"]` never produce the same key.
//!
//! Arguments that are not valid Unicode are encoded as an object holding
//! their raw code units (`{"bytes":[255]}` on Unix), which can never be
//! confused with a string element.

use std::ffi::OsStr;
use std::fmt;

use serde_json::{json, Value};

/// Deterministic identifier for one command invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for a program and its arguments (program first)
    pub fn from_argv<S: AsRef<OsStr>>(argv: &[S]) -> Self {
        let elements: Vec<Value> = argv.iter().map(|arg| encode_arg(arg.as_ref())).collect();
        Self(Value::Array(elements).to_string())
    }

    /// Returns the key as stored in the database
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_arg(arg: &OsStr) -> Value {
    match arg.to_str() {
        Some(text) => Value::String(text.to_string()),
        None => encode_raw(arg),
    }
}

#[cfg(unix)]
fn encode_raw(arg: &OsStr) -> Value {
    use std::os::unix::ffi::OsStrExt;
    json!({ "bytes": arg.as_bytes() })
}

#[cfg(windows)]
fn encode_raw(arg: &OsStr) -> Value {
    use std::os::windows::ffi::OsStrExt;
    json!({ "wide": arg.encode_wide().collect::<Vec<u16>>() })
}

#[cfg(not(any(unix, windows)))]
fn encode_raw(arg: &OsStr) -> Value {
    json!({ "lossy": arg.to_string_lossy() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_same_argv_gives_same_key() {
        let a = CacheKey::from_argv(&argv(&["ls", "-la", "/tmp"]));
        let b = CacheKey::from_argv(&argv(&["ls", "-la", "/tmp"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_format_is_stable() {
        let key = CacheKey::from_argv(&argv(&["echo", "hi"]));
        assert_eq!(key.as_str(), r#"["echo","hi"]"#);
    }

    #[test]
    fn test_string_and_os_string_argv_agree() {
        let strings = CacheKey::from_argv(&argv(&["echo", "hi"]));
        let os_strings =
            CacheKey::from_argv(&[std::ffi::OsString::from("echo"), std::ffi::OsString::from("hi")]);
        assert_eq!(strings, os_strings);
    }

    #[test]
    fn test_element_boundaries_are_distinguished() {
        let joined = CacheKey::from_argv(&argv(&["ab", "c"]));
        let split = CacheKey::from_argv(&argv(&["a", "bc"]));
        assert_ne!(joined, split);

        let spaced = CacheKey::from_argv(&argv(&["a", "b c"]));
        let separate = CacheKey::from_argv(&argv(&["a", "b", "c"]));
        assert_ne!(spaced, separate);
    }

    #[test]
    fn test_quotes_and_commas_cannot_forge_boundaries() {
        let tricky = CacheKey::from_argv(&argv(&[r#"a","b"#]));
        let plain = CacheKey::from_argv(&argv(&["a", "b"]));
        assert_ne!(tricky, plain);
    }

    #[test]
    fn test_argument_order_matters() {
        let a = CacheKey::from_argv(&argv(&["cmd", "x", "y"]));
        let b = CacheKey::from_argv(&argv(&["cmd", "y", "x"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_argument_is_significant() {
        let a = CacheKey::from_argv(&argv(&["cmd"]));
        let b = CacheKey::from_argv(&argv(&["cmd", ""]));
        assert_ne!(a, b);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_arguments_are_encoded_losslessly() {
        use std::os::unix::ffi::OsStrExt;

        let ff = OsStr::from_bytes(b"\xff");
        let fe = OsStr::from_bytes(b"\xfe");
        let replacement = OsStr::new("\u{fffd}");

        let key_ff = CacheKey::from_argv(&[OsStr::new("echo"), ff]);
        let key_fe = CacheKey::from_argv(&[OsStr::new("echo"), fe]);
        let key_replacement = CacheKey::from_argv(&[OsStr::new("echo"), replacement]);

        assert_eq!(key_ff.as_str(), r#"["echo",{"bytes":[255]}]"#);
        assert_ne!(key_ff, key_fe);
        assert_ne!(key_ff, key_replacement);
        assert_eq!(key_ff, CacheKey::from_argv(&[OsStr::new("echo"), ff]));
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_bytes_cannot_collide_with_lookalike_string() {
        use std::os::unix::ffi::OsStrExt;

        let raw = CacheKey::from_argv(&[OsStr::from_bytes(b"\xff")]);
        let lookalike = CacheKey::from_argv(&argv(&[r#"{"bytes":[255]}"#]));

        assert_ne!(raw, lookalike);
    }
}
