use serde::{de::DeserializeOwned, Serialize};
use std::hash::Hash;

/// Typed identifier of an aggregate, stored as TEXT
pub trait AggregateId:
    Clone + Copy + PartialEq + Eq + Hash + Serialize + DeserializeOwned + std::fmt::Debug
{
    fn as_string(&self) -> String;

    /// Parse an identifier coming from a URL path or a database row
    fn from_string(s: &str) -> Result<Self, String>;
}
