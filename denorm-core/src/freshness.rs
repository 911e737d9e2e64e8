//! Freshness markers and aggregate fingerprints.
//!
//! Every stored entity carries a [`Freshness`] written by whoever last put it
//! into storage. The engine never creates or advances these markers; it only
//! reads them and folds them into a [`Fingerprint`] describing everything a
//! denormalized output was built from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EntityRef;

/// A totally ordered last-modified marker.
///
/// Markers are expected to increase monotonically across the whole store
/// (a shared counter or a millisecond clock). Two versions of the same
/// entity with different markers are different versions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Freshness(u64);

impl Freshness {
    /// Create a marker with the given sequence value.
    pub const fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The zero marker (beginning of time).
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Raw sequence value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite fingerprint of a denormalized output.
///
/// `latest` is the most recent [`Freshness`] of anything visited while
/// building the output. `digest` is a blake3 hash over every visited
/// `(type, id, freshness)` in build order, together with markers for cycle
/// stubs, missing references and relationship shapes. Two builds with equal
/// fingerprints were built from the same versions of the same entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    latest: Freshness,
    digest: [u8; 32],
}

impl Fingerprint {
    /// Most recent freshness folded into this fingerprint.
    pub fn latest(&self) -> Freshness {
        self.latest
    }

    /// Raw digest bytes.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Hex rendering of the digest, for logs.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.digest).to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}@{}", &hex[..12], self.latest)
    }
}

// Record tags. Every record is tag-prefixed and strings are length-prefixed,
// so distinct build shapes never hash the same byte stream.
const TAG_NODE: u8 = b'N';
const TAG_STUB: u8 = b'S';
const TAG_COLLECTION: u8 = b'C';
const TAG_SINGLE: u8 = b'1';
const TAG_MANY: u8 = b'*';
const TAG_EMPTY: u8 = b'0';
const TAG_CHILD: u8 = b'c';
const TAG_MISSING: u8 = b'm';
const TAG_FAILED: u8 = b'f';

/// Incremental builder for a [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
    latest: Freshness,
}

impl FingerprintBuilder {
    fn start(tag: u8, latest: Freshness) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[tag]);
        Self { hasher, latest }
    }

    fn write_str(&mut self, value: &str) {
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
    }

    fn write_freshness(&mut self, freshness: Freshness) {
        self.hasher.update(&freshness.value().to_le_bytes());
    }

    /// Begin the fingerprint of a fully expanded entity.
    pub fn node(entity_type: &str, id: &str, freshness: Freshness) -> Self {
        let mut builder = Self::start(TAG_NODE, freshness);
        builder.write_str(entity_type);
        builder.write_str(id);
        builder.write_freshness(freshness);
        builder
    }

    /// Fingerprint of a shallow stub emitted instead of re-entering a node.
    pub fn stub(entity_type: &str, id: &str, freshness: Freshness) -> Fingerprint {
        let mut builder = Self::start(TAG_STUB, freshness);
        builder.write_str(entity_type);
        builder.write_str(id);
        builder.write_freshness(freshness);
        builder.finish()
    }

    /// Begin the fingerprint of a tagged collection.
    pub fn collection(schema: &str, tag: &str) -> Self {
        let mut builder = Self::start(TAG_COLLECTION, Freshness::zero());
        builder.write_str(schema);
        builder.write_str(tag);
        builder
    }

    /// Open a single-reference relationship slot.
    pub fn single(&mut self, key: &str) {
        self.hasher.update(&[TAG_SINGLE]);
        self.write_str(key);
    }

    /// Open a reference-sequence relationship slot of `len` references.
    pub fn many(&mut self, key: &str, len: usize) {
        self.hasher.update(&[TAG_MANY]);
        self.write_str(key);
        self.hasher.update(&(len as u64).to_le_bytes());
    }

    /// Record a relationship slot whose data is explicitly empty.
    pub fn empty(&mut self, key: &str) {
        self.hasher.update(&[TAG_EMPTY]);
        self.write_str(key);
    }

    /// Fold in a child output.
    pub fn child(&mut self, child: &Fingerprint) {
        self.hasher.update(&[TAG_CHILD]);
        self.write_freshness(child.latest);
        self.hasher.update(&child.digest);
        self.latest = self.latest.max(child.latest);
    }

    /// Record a reference that did not resolve.
    pub fn missing(&mut self, reference: &EntityRef) {
        self.hasher.update(&[TAG_MISSING]);
        self.write_str(&reference.entity_type);
        self.write_str(&reference.id);
    }

    /// Record a collection member whose build failed.
    pub fn failed(&mut self, reference: &EntityRef) {
        self.hasher.update(&[TAG_FAILED]);
        self.write_str(&reference.entity_type);
        self.write_str(&reference.id);
    }

    /// Finish the fingerprint.
    pub fn finish(self) -> Fingerprint {
        Fingerprint {
            latest: self.latest,
            digest: self.hasher.finalize().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_ordering() {
        let older = Freshness::new(5);
        let newer = Freshness::new(10);

        assert!(newer > older);
        assert_eq!(older.max(newer), newer);
        assert_eq!(newer.value(), 10);
    }

    #[test]
    fn test_freshness_zero_is_default() {
        assert_eq!(Freshness::default(), Freshness::zero());
    }

    #[test]
    fn test_freshness_is_transparent_on_the_wire() {
        let json = serde_json::to_string(&Freshness::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: Freshness = serde_json::from_str("42").unwrap();
        assert_eq!(back, Freshness::new(42));
    }

    #[test]
    fn test_child_raises_latest() {
        let child = FingerprintBuilder::stub("t", "child", Freshness::new(9));
        let mut parent = FingerprintBuilder::node("t", "parent", Freshness::new(3));
        parent.single("rel");
        parent.child(&child);
        assert_eq!(parent.finish().latest(), Freshness::new(9));
    }

    #[test]
    fn test_non_maximal_child_change_alters_digest() {
        let build = |child_freshness: u64| {
            let newest = FingerprintBuilder::stub("t", "newest", Freshness::new(100));
            let other = FingerprintBuilder::stub("t", "other", Freshness::new(child_freshness));
            let mut parent = FingerprintBuilder::node("t", "p", Freshness::new(1));
            parent.many("rel", 2);
            parent.child(&newest);
            parent.child(&other);
            parent.finish()
        };

        let before = build(5);
        let after = build(6);
        assert_eq!(before.latest(), after.latest());
        assert_ne!(before, after);
        assert_eq!(build(5), before);
    }

    #[test]
    fn test_stub_and_node_differ() {
        let stub = FingerprintBuilder::stub("t", "a", Freshness::new(1));
        let node = FingerprintBuilder::node("t", "a", Freshness::new(1)).finish();
        assert_ne!(stub, node);
    }

    #[test]
    fn test_missing_marker_alters_digest() {
        let reference = EntityRef::new("gone", "t");
        let mut with_missing = FingerprintBuilder::node("t", "a", Freshness::new(1));
        with_missing.single("rel");
        with_missing.missing(&reference);

        let mut without = FingerprintBuilder::node("t", "a", Freshness::new(1));
        without.single("rel");

        assert_ne!(with_missing.finish(), without.finish());
    }

    #[test]
    fn test_fingerprint_display() {
        let fingerprint = FingerprintBuilder::stub("t", "a", Freshness::new(7));
        let rendered = fingerprint.to_string();
        assert!(rendered.ends_with("@7"));
        assert_eq!(fingerprint.to_hex().len(), 64);
    }
}
