use serde::{Deserialize, Serialize};

/// Wraps a value that represents the *full*, authoritative state of something at a
/// point in time, as opposed to an incremental delta.
///
/// Used throughout the gateway to distinguish "replace my view of X" events
/// (`AccountEventKind::Snapshot`, `OrderSnapshot`, `PositionSnapshot`) from partial
/// updates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct Snapshot<T>(pub T);

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn as_ref(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Snapshot<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_roundtrips_inner_value() {
        let snap = Snapshot::new(42u32);
        assert_eq!(*snap.as_ref(), 42);
        assert_eq!(snap.into_inner(), 42);
    }
}
