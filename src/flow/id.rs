//! Identifier generation and validation.
//!
//! Generated ids are a slug of a human-readable seed (a title, or the edge
//! endpoints) followed by 4 hex characters. Caller-supplied ids are only
//! checked for shape.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Maximum slug length before the suffix is appended.
const MAX_SLUG_LEN: usize = 40;

/// Shape every stored id must have.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$").unwrap());

/// Global counter for deterministic ID generation in tests.
static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether to use deterministic IDs (for testing).
static USE_DETERMINISTIC_IDS: AtomicBool = AtomicBool::new(false);

/// Enable deterministic ID generation for testing.
///
/// When enabled, IDs will use a counter instead of random hex. The counter
/// is never reset, so ids drawn in one process stay distinct.
pub fn enable_deterministic_ids() {
    USE_DETERMINISTIC_IDS.store(true, Ordering::SeqCst);
}

/// Disable deterministic ID generation.
pub fn disable_deterministic_ids() {
    USE_DETERMINISTIC_IDS.store(false, Ordering::SeqCst);
}

/// Convert a seed string to a slug of at most `max_len` characters.
#[must_use]
pub fn slugify(seed: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(seed.len());
    let mut last_was_hyphen = true; // Start true to avoid leading hyphen

    for c in seed.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    if slug.len() > max_len {
        slug.truncate(max_len);
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

#[allow(clippy::cast_possible_truncation)]
fn random_suffix() -> String {
    if USE_DETERMINISTIC_IDS.load(Ordering::SeqCst) {
        let count = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("{count:04x}")
    } else {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};

        let mut hasher = RandomState::new().build_hasher();
        // Truncation is intentional - we only need entropy, not precision
        hasher.write_u64(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos() as u64),
        );
        format!("{:04x}", hasher.finish() & 0xFFFF)
    }
}

/// Generate an id from a seed, falling back to `fallback` when the seed has
/// no usable characters.
#[must_use]
pub fn generate_id(seed: &str, fallback: &str) -> String {
    let slug = slugify(seed, MAX_SLUG_LEN);
    let suffix = random_suffix();

    if slug.is_empty() {
        format!("{fallback}-{suffix}")
    } else {
        format!("{slug}-{suffix}")
    }
}

/// Generate an edge id from its endpoints.
#[must_use]
pub fn generate_edge_id(source: &str, target: &str) -> String {
    generate_id(&format!("{source} {target}"), "edge")
}

/// Check that a caller-supplied id has an acceptable shape.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the id is empty, too long, or
/// contains characters outside `[A-Za-z0-9_.:-]`.
pub fn validate_id(id: &str) -> Result<()> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("malformed id: {id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World", 50), "hello-world");
        assert_eq!(slugify("Fix: the bug (urgent)", 50), "fix-the-bug-urgent");
        assert_eq!(slugify("  leading spaces", 50), "leading-spaces");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("", 50), "");
        assert_eq!(slugify("!!!", 50), "");
        assert_eq!(slugify("日本語", 50), "");
    }

    #[test]
    fn test_slugify_truncation_removes_trailing_hyphens() {
        // "abc  d" becomes "abc-d"; truncating to 4 leaves "abc-" which is trimmed
        assert_eq!(slugify("abc  d", 4), "abc");
    }

    fn split_suffix(id: &str) -> (&str, &str) {
        id.rsplit_once('-').unwrap()
    }

    #[test]
    #[serial_test::serial]
    fn test_generate_id_format() {
        enable_deterministic_ids();

        // Other tests may draw ids concurrently, so only the shape is fixed
        let first = generate_id("Write docs", "task");
        let (slug, suffix) = split_suffix(&first);
        assert_eq!(slug, "write-docs");
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        let second = generate_id("???", "task");
        let (slug, next) = split_suffix(&second);
        assert_eq!(slug, "task");
        assert!(u64::from_str_radix(next, 16).unwrap() > u64::from_str_radix(suffix, 16).unwrap());

        disable_deterministic_ids();
    }

    #[test]
    #[serial_test::serial]
    fn test_generate_edge_id() {
        enable_deterministic_ids();

        let id = generate_edge_id("design-0001", "build-0002");
        assert!(id.starts_with("design-0001-build-0002-"));
        assert_eq!(id.len(), "design-0001-build-0002-".len() + 4);

        disable_deterministic_ids();
    }

    #[test]
    #[serial_test::serial]
    fn test_generated_ids_are_valid() {
        disable_deterministic_ids();
        let long_seed = "x".repeat(500);
        for seed in ["Hello", "", "日本語", long_seed.as_str()] {
            let id = generate_id(seed, "task");
            assert!(validate_id(&id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("e1").is_ok());
        assert!(validate_id("reactflow__edge-a-b").is_ok());
        assert!(validate_id("flow:1.2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("-leading").is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id("a,b").is_err());
        assert!(validate_id(&"a".repeat(129)).is_err());
    }
}
