//! Field-level comparison between a desired row and an existing external record

use crate::external::{ExternalRecord, ExternalTable, Fields, GUID_COLUMN, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub column: &'static str,
    pub old: Value,
    pub new: Value,
}

/// Whether a column takes part in the comparison
///
/// The identifier and the bookkeeping columns (timestamps, version) are
/// written by the engine itself and never count as a difference.
pub fn is_compared(table: &ExternalTable, column: &str) -> bool {
    column != GUID_COLUMN
        && column != table.key
        && Some(column) != table.modified
        && Some(column) != table.created
        && Some(column) != table.version
}

/// Columns whose desired value differs from the record's
pub fn diff_fields(table: &ExternalTable, desired: &Fields, existing: &ExternalRecord) -> Vec<FieldChange> {
    desired
        .iter()
        .filter(|(column, _)| is_compared(table, column))
        .filter_map(|(column, new)| {
            let old = existing.field(column);
            if old == new {
                None
            } else {
                Some(FieldChange {
                    column: *column,
                    old: old.clone(),
                    new: new.clone(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::table_for;
    use crate::identity::ExternalGuid;
    use crate::model::EntityKind;

    fn record(fields: &[(&'static str, Value)]) -> ExternalRecord {
        ExternalRecord {
            key: 1,
            guid: ExternalGuid::new_random(),
            fields: fields.iter().cloned().collect(),
            tags: vec![],
        }
    }

    #[test]
    fn test_bookkeeping_columns_are_ignored() {
        let table = table_for(EntityKind::Class);
        let existing = record(&[
            ("Name", Value::text("Person")),
            ("Version", Value::text("1.0")),
            ("ModifiedDate", Value::text("2020-01-01 00:00:00")),
        ]);
        let desired: Fields = [
            ("Name", Value::text("Person")),
            ("Version", Value::text("7.0")),
            ("ModifiedDate", Value::text("2030-01-01 00:00:00")),
        ]
        .into_iter()
        .collect();

        assert!(diff_fields(table, &desired, &existing).is_empty());
    }

    #[test]
    fn test_changed_and_cleared_fields() {
        let table = table_for(EntityKind::Class);
        let existing = record(&[("Name", Value::text("Person")), ("Alias", Value::text("P"))]);
        let desired: Fields = [
            ("Name", Value::text("Human")),
            ("Alias", Value::Null),
            ("Stereotype", Value::Null),
        ]
        .into_iter()
        .collect();

        let changes = diff_fields(table, &desired, &existing);

        let columns: Vec<_> = changes.iter().map(|c| c.column).collect();
        assert_eq!(columns, vec!["Alias", "Name"]);
        assert_eq!(changes[1].old, Value::text("Person"));
    }
}
