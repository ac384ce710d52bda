//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Report criteria
/// snapshots and artifact names are value objects: once built they never change,
/// and two of them with the same contents are interchangeable.
///
/// The trait requires `Clone`, `PartialEq` and `Debug` so values can be copied
/// into job records, compared in tests, and logged.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
