use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use once_cell::sync::Lazy;

#[derive(Debug, Default)]
pub struct InterningTable {
    inner: RwLock<TableInner>,
}

#[derive(Debug, Default)]
struct TableInner {
    strings: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());

        inner.strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        // Another thread may have inserted it between the two locks
        if let Some(index) = inner.indices.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = inner.strings.len() as u32;

        inner.strings.push(leaked);
        inner.indices.insert(leaked, index);

        index
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());

        inner.indices.get(string).copied()
    }
}

/// An interned identifier. Two names are equal iff their strings are equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u32);

impl Name {
    pub fn new(value: &str) -> Self {
        Self(INTERNING_TABLE.insert_if_absent(value))
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE
            .get(self.0)
            .expect("Once a name is interned, its string is never removed from the table")
    }
}

impl core::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Name")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = Name::new("counter");
        let b = Name::new("counter");
        let c = Name::new("other_counter");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.value(), "counter");
        assert_eq!(c.to_string(), "other_counter");
    }
}
