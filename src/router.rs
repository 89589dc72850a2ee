//! Partition key resolution and routing.
//!
//! A produced message carries a map of field values; the router resolves the
//! configured key template against those fields and hashes the resulting key
//! onto a partition index. Resolution is pure: the same fields and template
//! always yield the same key, and the same key always lands on the same
//! partition for a fixed partition count.

use std::collections::BTreeMap;

/// Resolve a key template against a message's field values.
///
/// The template is split into maximal word runs (`[A-Za-z0-9_]+`); a run
/// naming a known field is replaced by that field's value, everything else
/// passes through literally. Word-boundary semantics mean `account_id` never
/// matches inside `account_id_suffix`, and composite templates like
/// `account_id:record_id` resolve each side independently, leaving unknown
/// tokens in place. A template with no known tokens comes back unchanged —
/// a degraded key, not an error.
pub fn resolve_key(fields: &BTreeMap<String, String>, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut token = String::new();

    let flush = |out: &mut String, token: &mut String| {
        if token.is_empty() {
            return;
        }
        match fields.get(token.as_str()) {
            Some(value) => out.push_str(value),
            None => out.push_str(token),
        }
        token.clear();
    };

    for c in template.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            token.push(c);
        } else {
            flush(&mut out, &mut token);
            out.push(c);
        }
    }
    flush(&mut out, &mut token);
    out
}

/// Polynomial string hash with multiplier 31 over the key's bytes,
/// accumulated in a wrapping 32-bit signed register, absolute value taken
/// last. Deterministic, platform independent, and stable across calls.
pub fn hash_key(key: &str) -> u32 {
    let mut hash: i32 = 0;
    for byte in key.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as i32);
    }
    hash.unsigned_abs()
}

/// Resolve the partition key and map it to a partition index.
pub fn route(
    fields: &BTreeMap<String, String>,
    template: &str,
    partition_count: u32,
) -> (String, u32) {
    let key = resolve_key(fields, template);
    let partition = hash_key(&key) % partition_count.max(1);
    (key, partition)
}
