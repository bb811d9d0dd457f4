//! Specialised collection types used throughout the gateway for the small,
//! string/enum-keyed maps that dominate broker integration code (symbols, channels,
//! endpoints), where a fast hasher beats the default SipHash for negligible cost.

/// Fast `IndexMap` using the FNV hasher, appropriate for the small keys (symbols,
/// broker kinds, channel names) used across the gateway.
pub type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, fnv::FnvBuildHasher>;

/// Fast `IndexSet` using the FNV hasher.
pub type FnvIndexSet<T> = indexmap::IndexSet<T, fnv::FnvBuildHasher>;

/// Represents one-or-many items, never empty. Useful where an API sometimes returns a
/// single value and sometimes a batch (eg/ a single fill vs a batch of fills).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_flattens_to_vec() {
        assert_eq!(OneOrMany::One(1).into_vec(), vec![1]);
        assert_eq!(OneOrMany::Many(vec![1, 2]).into_vec(), vec![1, 2]);
    }
}
