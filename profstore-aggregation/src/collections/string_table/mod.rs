// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::{checked_id, FxIndexSet, Id, StringId};

/// Holds unique strings and provides [StringId]s that correspond to the order
/// that the strings were inserted.
#[derive(Clone, Debug)]
pub struct StringTable {
    /// The order of the set becomes the StringId.
    strings: FxIndexSet<Box<str>>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// Creates a new string table, which initially holds the empty string and
    /// no others.
    pub fn new() -> Self {
        let mut strings = FxIndexSet::default();
        strings.insert(Box::from(""));
        Self { strings }
    }

    /// Returns the number of strings currently held in the string table.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Adds the string to the string table if it isn't present already, and
    /// returns a [StringId] that corresponds to the order that this string
    /// was originally inserted. Fails without storing the string once the
    /// table has handed out every id.
    pub fn intern(&mut self, str: &str) -> anyhow::Result<StringId> {
        if let Some(offset) = self.strings.get_index_of(str) {
            return Ok(StringId::from_offset(offset));
        }
        let id = checked_id(self.strings.len())?;
        self.strings.insert(Box::from(str));
        Ok(id)
    }

    /// Returns the string for the id, or the empty string for an id that was
    /// not handed out by this table.
    pub fn get(&self, id: StringId) -> &str {
        self.strings
            .get_index(id.to_offset())
            .map(AsRef::as_ref)
            .unwrap_or("")
    }

    /// Copies the strings out in id order, ready to become a pprof string
    /// table.
    pub fn to_vec(&self) -> Vec<String> {
        self.strings.iter().map(|s| String::from(&**s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        let mut table = StringTable::new();
        assert_eq!(table.len(), 1);
        assert_eq!(table.intern("").unwrap(), StringId::ZERO);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn interning_is_stable() {
        let mut table = StringTable::new();
        let main = table.intern("main").unwrap();
        let alloc = table.intern("alloc").unwrap();
        assert_eq!(table.intern("main").unwrap(), main);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(alloc), "alloc");
        assert_eq!(table.to_vec(), vec!["", "main", "alloc"]);
    }
}
