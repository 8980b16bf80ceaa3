// src/models/patch.rs
//
// Explicit update payloads. An updatable field is either left alone or set
// to a concrete value; there is no "apply whatever keys the client sent"
// path. A key absent from the JSON body deserializes to `Unchanged`, a
// present key (including `null` for `Patch<Option<T>>`) to `Set`.
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Unchanged,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Overwrites `slot` when this patch carries a value.
    pub fn apply_to(self, slot: &mut T) {
        if let Patch::Set(value) = self {
            *slot = value;
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestPatch {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        note: Patch<Option<String>>,
    }

    #[test]
    fn test_absent_field_is_unchanged() {
        let patch: TestPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.name, Patch::Unchanged);
        assert_eq!(patch.note, Patch::Unchanged);
    }

    #[test]
    fn test_present_field_is_set() {
        let patch: TestPatch = serde_json::from_str(r#"{"name": "Vase"}"#).unwrap();
        assert_eq!(patch.name, Patch::Set("Vase".to_string()));
    }

    #[test]
    fn test_null_clears_nullable_field() {
        let patch: TestPatch = serde_json::from_str(r#"{"note": null}"#).unwrap();
        assert_eq!(patch.note, Patch::Set(None));
    }

    #[test]
    fn test_apply_to_overwrites_only_when_set() {
        let mut name = "old".to_string();
        Patch::Unchanged.apply_to(&mut name);
        assert_eq!(name, "old");
        Patch::Set("new".to_string()).apply_to(&mut name);
        assert_eq!(name, "new");
    }
}
