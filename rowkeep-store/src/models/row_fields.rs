//! Ordered field-name → value container for row data
//!
//! Rows are persisted as JSON objects. Key order is significant (it is the
//! column order the row was built from), so the container is a sequence of
//! pairs and serializes/deserializes entries in sequence order instead of
//! relying on map iteration order.

use crate::error::{StoreError, StoreResult};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFields(Vec<(String, String)>);

impl RowFields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a row strictly from a column order
    ///
    /// Missing cells become empty strings; cells past the last column are dropped.
    pub fn from_columns(columns: &[String], cells: &[String]) -> Self {
        let entries = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value = cells.get(idx).cloned().unwrap_or_default();
                (column.clone(), value)
            })
            .collect();
        Self(entries)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Overwrite a field in place, appending it if absent
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| name == field) {
            Some(entry) => entry.1 = value,
            None => self.0.push((field.to_string(), value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// View of this row in the given column order
    ///
    /// Every column is present (empty string when absent from the row) and
    /// keys outside the column order are left out.
    pub fn project(&self, columns: &[String]) -> Self {
        let entries = columns
            .iter()
            .map(|column| {
                let value = self.get(column).unwrap_or_default().to_string();
                (column.clone(), value)
            })
            .collect();
        Self(entries)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Unmarshal(e.to_string()))
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        serde_json::from_str(raw).map_err(|e| StoreError::Unmarshal(e.to_string()))
    }
}

impl FromIterator<(String, String)> for RowFields {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut fields = RowFields::new();
        for (name, value) in iter {
            fields.set(&name, value);
        }
        fields
    }
}

impl Serialize for RowFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RowFieldsVisitor;

impl<'de> Visitor<'de> for RowFieldsVisitor {
    type Value = RowFields;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object of string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut fields = RowFields::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            fields.set(&name, value);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for RowFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowFieldsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_columns_pads_short_rows() {
        let row = RowFields::from_columns(&cols(&["a", "b", "c"]), &["1".to_string()]);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(row.get("b"), Some(""));
        assert_eq!(row.get("c"), Some(""));
    }

    #[test]
    fn test_json_preserves_declared_order() {
        let row = RowFields::from_columns(
            &cols(&["zeta", "alpha", "mid"]),
            &["1".to_string(), "2".to_string(), "3".to_string()],
        );
        let json = row.to_json().unwrap();
        assert_eq!(json, r#"{"zeta":"1","alpha":"2","mid":"3"}"#);

        let back = RowFields::from_json(&json).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_project_reorders_pads_and_drops_extras() {
        let mut row = RowFields::new();
        row.set("c", "3");
        row.set("a", "1");
        row.set("extra", "x");

        let view = row.project(&cols(&["a", "b", "c"]));
        assert_eq!(
            view.iter().collect::<Vec<_>>(),
            vec![("a", "1"), ("b", ""), ("c", "3")]
        );
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut row = RowFields::from_columns(&cols(&["a", "b"]), &["1".to_string(), "2".to_string()]);
        row.set("a", "changed");
        assert_eq!(row.iter().collect::<Vec<_>>(), vec![("a", "changed"), ("b", "2")]);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(RowFields::from_json("[1,2]"), Err(StoreError::Unmarshal(_))));
        assert!(matches!(RowFields::from_json(r#"{"a":1}"#), Err(StoreError::Unmarshal(_))));
        assert!(matches!(RowFields::from_json("{broken"), Err(StoreError::Unmarshal(_))));
    }
}
