//! Model entity -> external row translation

use crate::error::Result;
use crate::external::{Fields, Value};
use crate::identity::IdentityMap;
use crate::model::{
    Association, Attribute, AttributeType, Class, Diagram, Enumeration, EnumerationLiteral,
    Generalization, Meta, ModelEntity, Package,
};

/// Entities that can be written to the external store
///
/// `external_fields` yields the desired value of every column the entity
/// owns; columns it leaves out are never touched. References are translated
/// to GUIDs through `ids`, which rejects space collisions.
pub trait ExternalMapping: ModelEntity {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields>;

    fn external_tags(&self) -> &std::collections::BTreeMap<String, String> {
        &self.meta().tags
    }
}

fn reference(ids: &mut IdentityMap, id: Option<&str>) -> Result<Value> {
    match id {
        Some(id) => Ok(Value::Ref(ids.map(id)?)),
        None => Ok(Value::Null),
    }
}

/// Object-level descriptive columns shared by classes and enumerations
fn object_fields(meta: &Meta, fields: &mut Fields) {
    fields.insert("Name", Value::opt(meta.name.as_deref()));
    fields.insert("Alias", Value::opt(meta.alias.as_deref()));
    fields.insert("Author", Value::opt(meta.author.as_deref()));
    fields.insert("Note", Value::opt(meta.definitie.as_deref()));
    fields.insert("Stereotype", Value::opt(meta.stereotype.as_deref()));
    fields.insert("Status", Value::opt(meta.status.as_deref()));
    fields.insert("Phase", Value::opt(meta.phase.as_deref()));
}

impl ExternalMapping for Package {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Name", Value::opt(self.meta.name.as_deref()));
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        fields.insert("Parent_ID", reference(ids, self.parent_package_id.as_deref())?);
        Ok(fields)
    }
}

impl ExternalMapping for Class {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        let object_type = if self.is_datatype { "DataType" } else { "Class" };
        fields.insert("Object_Type", Value::text(object_type));
        object_fields(&self.meta, &mut fields);
        fields.insert("Package_ID", reference(ids, self.package_id.as_deref())?);
        Ok(fields)
    }
}

impl ExternalMapping for Enumeration {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        object_fields(&self.meta, &mut fields);
        fields.insert("Package_ID", reference(ids, self.package_id.as_deref())?);
        Ok(fields)
    }
}

impl ExternalMapping for Attribute {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Object_ID", reference(ids, Some(self.clazz_id.as_str()))?);
        fields.insert("Name", Value::opt(self.meta.name.as_deref()));
        fields.insert("Style", Value::opt(self.meta.alias.as_deref()));
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        fields.insert("Stereotype", Value::opt(self.meta.stereotype.as_deref()));
        match &self.attr_type {
            AttributeType::Untyped => {
                fields.insert("Type", Value::Null);
                fields.insert("Classifier", Value::Null);
            }
            AttributeType::Primitive(name) => {
                fields.insert("Type", Value::text(name.as_str()));
                fields.insert("Classifier", Value::Null);
            }
            // The type name column is left alone: the store keeps the classifier's name there
            AttributeType::Class(id) | AttributeType::Enumeration(id) => {
                fields.insert("Classifier", reference(ids, Some(id.as_str()))?);
            }
        }
        fields.insert("LowerBound", Value::opt(self.mult_start.as_deref()));
        fields.insert("UpperBound", Value::opt(self.mult_end.as_deref()));
        fields.insert("Length", Value::opt(self.length.as_deref()));
        Ok(fields)
    }
}

impl ExternalMapping for EnumerationLiteral {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Object_ID", reference(ids, Some(self.enumeration_id.as_str()))?);
        fields.insert("Name", Value::opt(self.meta.name.as_deref()));
        fields.insert("Style", Value::opt(self.meta.alias.as_deref()));
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        Ok(fields)
    }
}

impl ExternalMapping for Association {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Name", Value::opt(self.meta.name.as_deref()));
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        fields.insert("Stereotype", Value::opt(self.meta.stereotype.as_deref()));
        fields.insert("Start_Object_ID", reference(ids, Some(self.src_class_id.as_str()))?);
        fields.insert("End_Object_ID", reference(ids, Some(self.dst_class_id.as_str()))?);
        fields.insert(
            "SourceCard",
            Value::text(Association::cardinality(&self.src_mult_start, &self.src_mult_end)),
        );
        fields.insert(
            "DestCard",
            Value::text(Association::cardinality(&self.dst_mult_start, &self.dst_mult_end)),
        );
        fields.insert("SourceRole", Value::opt(self.src_role.as_deref()));
        fields.insert("DestRole", Value::opt(self.dst_role.as_deref()));
        Ok(fields)
    }
}

impl ExternalMapping for Generalization {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        fields.insert("Start_Object_ID", reference(ids, Some(self.subclass_id.as_str()))?);
        fields.insert("End_Object_ID", reference(ids, Some(self.superclass_id.as_str()))?);
        Ok(fields)
    }
}

impl ExternalMapping for Diagram {
    fn external_fields(&self, ids: &mut IdentityMap) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("Name", Value::opt(self.meta.name.as_deref()));
        fields.insert("Notes", Value::opt(self.meta.definitie.as_deref()));
        fields.insert("Author", Value::opt(self.meta.author.as_deref()));
        fields.insert("Stereotype", Value::opt(self.meta.stereotype.as_deref()));
        fields.insert("Package_ID", reference(ids, Some(self.package_id.as_str()))?);
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::external::table_for;
    use crate::identity::to_external;

    const CLASS_ID: &str = "EAID_AAAAAAAA_0000_0000_0000_000000000001";
    const PKG_ID: &str = "EAPK_BBBBBBBB_0000_0000_0000_000000000002";

    #[test]
    fn test_class_fields_reference_package_guid() {
        let mut ids = IdentityMap::new();
        let mut class = Class::new(CLASS_ID, "Person", PKG_ID);
        class.is_datatype = true;

        let fields = class.external_fields(&mut ids).unwrap();

        let (_, pkg_guid) = to_external(PKG_ID).unwrap();
        assert_eq!(fields["Package_ID"], Value::Ref(pkg_guid));
        assert_eq!(fields["Object_Type"], Value::text("DataType"));
        assert_eq!(fields["Name"], Value::text("Person"));
    }

    #[test]
    fn test_mapped_columns_exist_in_table() {
        let mut ids = IdentityMap::new();
        let attr = Attribute::new("EAID_AAAAAAAA_0000_0000_0000_000000000003", "age", CLASS_ID)
            .typed(AttributeType::Primitive("int".into()));

        let fields = attr.external_fields(&mut ids).unwrap();

        let table = table_for(Attribute::KIND);
        assert!(fields.keys().all(|c| table.column(c).is_some()));
        assert_eq!(fields["Type"], Value::text("int"));
    }

    #[test]
    fn test_non_internal_reference_is_rejected() {
        let mut ids = IdentityMap::new();
        let assoc = Association::new("EAID_AAAAAAAA_0000_0000_0000_000000000004", CLASS_ID, "c0");

        let err = assoc.external_fields(&mut ids).unwrap_err();

        assert!(matches!(err, SyncError::InvalidIdentifier { .. }));
    }
}
