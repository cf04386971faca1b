//! Column metadata produced by schema introspection.

use serde::Serialize;

/// Normalized description of one table column.
///
/// Whatever sentinel encoding the native catalog uses (textual yes/no,
/// 0/1 integers, key markers), the owning adapter canonicalizes it before a
/// descriptor is built: `nullable` and `is_primary` are real booleans and
/// `declared_type` is uppercased.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    /// Zero-based position in declared column order.
    pub ordinal: usize,
    pub name: String,
    /// Declared type, uppercased (e.g. `INTEGER`, `CHARACTER VARYING`).
    pub declared_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary: bool,
}

/// A single pass over a table's column descriptors, in declared order.
///
/// The sequence is finite, lazy and not restartable; call
/// `Connection::schema_of` again for a fresh pass.
pub struct SchemaRows {
    inner: Box<dyn Iterator<Item = ColumnDescriptor> + Send>,
}

impl SchemaRows {
    /// Wrap an adapter-produced descriptor sequence.
    pub fn new(inner: impl Iterator<Item = ColumnDescriptor> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for SchemaRows {
    type Item = ColumnDescriptor;

    fn next(&mut self) -> Option<ColumnDescriptor> {
        self.inner.next()
    }
}

impl std::fmt::Debug for SchemaRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRows").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(ordinal: usize, name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            ordinal,
            name: name.to_string(),
            declared_type: "INTEGER".to_string(),
            nullable: false,
            default_value: None,
            is_primary: ordinal == 0,
        }
    }

    #[test]
    fn schema_rows_is_single_pass() {
        let mut rows = SchemaRows::new(vec![descriptor(0, "id"), descriptor(1, "n")].into_iter());
        assert_eq!(rows.next().unwrap().name, "id");
        assert_eq!(rows.next().unwrap().name, "n");
        assert!(rows.next().is_none());
        assert!(rows.next().is_none());
    }
}
