use indexmap::map::{Iter, Keys};
use indexmap::IndexMap;

/**
An ordered mapping from entity ID to byte offset into the file it was
written to.

A wrapper around [`indexmap::IndexMap`].
*/
#[derive(Default, Debug, Clone, PartialEq)]
pub struct OffsetIndex {
    /// The name of the index, `spectrum` or `chromatogram`
    pub name: String,

    /// The mapping from ID to byte offset, ordered by occurrence
    pub offsets: IndexMap<Box<str>, u64>,
}

impl OffsetIndex {
    pub fn new(name: String) -> OffsetIndex {
        OffsetIndex {
            name,
            ..Default::default()
        }
    }

    /// Get the offset of the specified key
    #[inline]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Get the associated key and offset for the specified index position
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(&str, u64)> {
        self.offsets
            .get_index(index)
            .map(|(key, offset)| (key.as_ref(), *offset))
    }

    /// Insert `key` into the index with an offset value
    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, key: T, offset: u64) -> Option<u64> {
        self.offsets.insert(key.into(), offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn keys(&self) -> Keys<'_, Box<str>, u64> {
        self.offsets.keys()
    }

    /// Iterate over the keys and offsets
    pub fn iter(&self) -> Iter<'_, Box<str>, u64> {
        self.offsets.iter()
    }

    /// Shift every offset by `delta`, as when a spooled section is placed in its final
    /// position
    pub fn shift(&mut self, delta: u64) {
        self.offsets.values_mut().for_each(|v| *v += delta);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets() {
        let mut index = OffsetIndex::new("spectrum".into());
        index.insert("scan=1", 10);
        index.insert("scan=2", 250);
        index.shift(100);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("scan=2"), Some(350));
        assert_eq!(index.get_index(0), Some(("scan=1", 110)));
        assert_eq!(index.keys().count(), 2);
    }
}
