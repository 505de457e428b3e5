//! Batches of key → dump pairs.

use std::collections::hash_map;
use std::collections::HashMap;

use bytes::Bytes;

/// The keys discovered by one scan step together with their dumps.
///
/// `seq` counts scan steps from zero and is only used for logging and for
/// checking delivery order; the pairs themselves carry no ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    seq: u64,
    entries: HashMap<Bytes, Bytes>,
}

impl Batch {
    /// Create an empty batch for scan step `seq`.
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            entries: HashMap::new(),
        }
    }

    /// Create an empty batch with room for `capacity` pairs.
    pub fn with_capacity(seq: u64, capacity: usize) -> Self {
        Self {
            seq,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Scan step this batch came from.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Add a pair. A repeated key keeps the latest dump.
    pub fn insert(&mut self, key: Bytes, dump: Bytes) {
        self.entries.insert(key, dump);
    }

    /// Dump stored for `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for batches from steps that returned no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of all dumps in bytes.
    pub fn dump_bytes(&self) -> u64 {
        self.entries.values().map(|v| v.len() as u64).sum()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = (&'a Bytes, &'a Bytes);
    type IntoIter = hash_map::Iter<'a, Bytes, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Batch {
    type Item = (Bytes, Bytes);
    type IntoIter = hash_map::IntoIter<Bytes, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_basics() {
        let mut batch = Batch::new(3);
        assert!(batch.is_empty());
        batch.insert(Bytes::from("a"), Bytes::from("12"));
        batch.insert(Bytes::from("b"), Bytes::from("345"));
        batch.insert(Bytes::from("a"), Bytes::from("1"));
        assert_eq!(batch.seq(), 3);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(b"a"), Some(&Bytes::from("1")));
        assert_eq!(batch.dump_bytes(), 4);
    }
}
