//! Cache key derivation: the canonical default serializer, plus a
//! truncated hash used only for span attributes (spec.md §3: "hashed or
//! truncated for privacy").

use serde_json::Value;
use sha1::{Digest, Sha1};

/// A user-supplied function computing a cache key from the primitive
/// input. Receives only the input, not the context — spec.md §9 Open
/// Questions resolves this in favor of the source's default.
pub type KeyFn = Box<dyn Fn(&Value) -> String + Send + Sync>;

/// Default key derivation: canonical JSON of the input. `serde_json::Map`
/// is backed by a `BTreeMap` (no `preserve_order` feature enabled
/// anywhere in this workspace), so object keys always serialize in sorted
/// order — two semantically equal objects with differently-ordered
/// fields produce the same key. Differently-*shaped* JSON that happens to
/// be semantically equivalent (e.g. `1` vs `1.0`) is still treated as a
/// distinct key, per spec.md §3.
pub(crate) fn canonical_key(input: &Value) -> String {
    serde_json::to_string(input).unwrap_or_default()
}

/// Truncated SHA-1 of a cache key, safe to attach to a span without
/// leaking the full (possibly sensitive) key contents.
pub(crate) fn hashed_for_span(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
