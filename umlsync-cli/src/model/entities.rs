//! The typed entity graph: packages, classes and everything hanging off them

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::kind::{EntityKind, Meta, Reference};

/// Name given to placeholder classes created for dangling association ends
pub const ORPHAN_CLASS_NAME: &str = "Orphan";

/// Common behaviour of every entity stored in a schema partition
pub trait ModelEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: EntityKind;

    fn meta(&self) -> &Meta;

    fn meta_mut(&mut self) -> &mut Meta;

    /// The entity this one hangs off in the ownership tree, if any
    ///
    /// Associations are indexed by their source class and generalizations by
    /// their subclass so outgoing edges can be walked like children.
    fn owner_id(&self) -> Option<&str>;

    /// All id-valued fields pointing at other entities
    fn references(&self) -> Vec<Reference<'_>>;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn name(&self) -> Option<&str> {
        self.meta().name.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_package_id: Option<String>,
}

impl Package {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Package {
            meta: Meta::named(id, name),
            parent_package_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_package_id = Some(parent_id.into());
        self
    }
}

impl ModelEntity for Package {
    const KIND: EntityKind = EntityKind::Package;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        self.parent_package_id.as_deref()
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.parent_package_id
            .as_deref()
            .map(|id| Reference::new("parent_package_id", EntityKind::Package, id))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Class {
    #[serde(flatten)]
    pub meta: Meta,
    /// Only empty while a parser is still assembling the graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default)]
    pub is_datatype: bool,
}

impl Class {
    pub fn new(id: impl Into<String>, name: impl Into<String>, package_id: impl Into<String>) -> Self {
        Class {
            meta: Meta::named(id, name),
            package_id: Some(package_id.into()),
            is_datatype: false,
        }
    }

    /// Placeholder for an association end that points nowhere
    pub fn orphan(id: impl Into<String>) -> Self {
        Class {
            meta: Meta::named(id, ORPHAN_CLASS_NAME),
            package_id: None,
            is_datatype: false,
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.package_id.is_none() && self.meta.name.as_deref() == Some(ORPHAN_CLASS_NAME)
    }
}

impl ModelEntity for Class {
    const KIND: EntityKind = EntityKind::Class;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.package_id
            .as_deref()
            .map(|id| Reference::new("package_id", EntityKind::Package, id))
            .into_iter()
            .collect()
    }
}

/// What an attribute is typed by; the variants are mutually exclusive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum AttributeType {
    #[default]
    Untyped,
    /// Free primitive type name (e.g. "string", "int")
    Primitive(String),
    /// Object-typed attribute pointing at a class id
    Class(String),
    /// Attribute typed by an enumeration id
    Enumeration(String),
}

impl AttributeType {
    /// Rewrite the referenced classifier id, leaving primitives untouched
    ///
    /// `f` receives the reference field name along with the id.
    pub fn map_ref(&self, f: impl FnOnce(&'static str, &str) -> String) -> AttributeType {
        match self {
            AttributeType::Class(id) => AttributeType::Class(f("type_class_id", id)),
            AttributeType::Enumeration(id) => AttributeType::Enumeration(f("enumeration_id", id)),
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(flatten)]
    pub meta: Meta,
    pub clazz_id: String,
    #[serde(default)]
    pub attr_type: AttributeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mult_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mult_end: Option<String>,
}

impl Attribute {
    pub fn new(id: impl Into<String>, name: impl Into<String>, clazz_id: impl Into<String>) -> Self {
        Attribute {
            meta: Meta::named(id, name),
            clazz_id: clazz_id.into(),
            ..Default::default()
        }
    }

    pub fn typed(mut self, attr_type: AttributeType) -> Self {
        self.attr_type = attr_type;
        self
    }

    pub fn primitive(&self) -> Option<&str> {
        match &self.attr_type {
            AttributeType::Primitive(name) => Some(name),
            _ => None,
        }
    }

    pub fn type_class_id(&self) -> Option<&str> {
        match &self.attr_type {
            AttributeType::Class(id) => Some(id),
            _ => None,
        }
    }

    pub fn enumeration_id(&self) -> Option<&str> {
        match &self.attr_type {
            AttributeType::Enumeration(id) => Some(id),
            _ => None,
        }
    }
}

impl ModelEntity for Attribute {
    const KIND: EntityKind = EntityKind::Attribute;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.clazz_id)
    }

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = vec![Reference::new("clazz_id", EntityKind::Class, &self.clazz_id)];
        if let Some(id) = self.type_class_id() {
            refs.push(Reference::new("type_class_id", EntityKind::Class, id));
        }
        if let Some(id) = self.enumeration_id() {
            refs.push(Reference::new("enumeration_id", EntityKind::Enumeration, id));
        }
        refs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enumeration {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
}

impl Enumeration {
    pub fn new(id: impl Into<String>, name: impl Into<String>, package_id: impl Into<String>) -> Self {
        Enumeration {
            meta: Meta::named(id, name),
            package_id: Some(package_id.into()),
        }
    }
}

impl ModelEntity for Enumeration {
    const KIND: EntityKind = EntityKind::Enumeration;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    fn references(&self) -> Vec<Reference<'_>> {
        self.package_id
            .as_deref()
            .map(|id| Reference::new("package_id", EntityKind::Package, id))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumerationLiteral {
    #[serde(flatten)]
    pub meta: Meta,
    pub enumeration_id: String,
}

impl EnumerationLiteral {
    pub fn new(id: impl Into<String>, name: impl Into<String>, enumeration_id: impl Into<String>) -> Self {
        EnumerationLiteral {
            meta: Meta::named(id, name),
            enumeration_id: enumeration_id.into(),
        }
    }
}

impl ModelEntity for EnumerationLiteral {
    const KIND: EntityKind = EntityKind::Literal;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.enumeration_id)
    }

    fn references(&self) -> Vec<Reference<'_>> {
        vec![Reference::new("enumeration_id", EntityKind::Enumeration, &self.enumeration_id)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    #[serde(flatten)]
    pub meta: Meta,
    pub src_class_id: String,
    pub dst_class_id: String,
    pub src_mult_start: String,
    pub src_mult_end: String,
    pub dst_mult_start: String,
    pub dst_mult_end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_role: Option<String>,
}

impl Association {
    pub fn new(id: impl Into<String>, src_class_id: impl Into<String>, dst_class_id: impl Into<String>) -> Self {
        Association {
            meta: Meta::new(id),
            src_class_id: src_class_id.into(),
            dst_class_id: dst_class_id.into(),
            src_mult_start: "1".to_string(),
            src_mult_end: "1".to_string(),
            dst_mult_start: "0".to_string(),
            dst_mult_end: "*".to_string(),
            src_role: None,
            dst_role: None,
        }
    }

    /// Multiplicity in "start..end" notation, collapsed when both bounds agree
    pub fn cardinality(start: &str, end: &str) -> String {
        if start == end || end.is_empty() {
            start.to_string()
        } else {
            format!("{}..{}", start, end)
        }
    }
}

impl ModelEntity for Association {
    const KIND: EntityKind = EntityKind::Association;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.src_class_id)
    }

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            Reference::new("src_class_id", EntityKind::Class, &self.src_class_id),
            Reference::new("dst_class_id", EntityKind::Class, &self.dst_class_id),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generalization {
    #[serde(flatten)]
    pub meta: Meta,
    pub superclass_id: String,
    pub subclass_id: String,
}

impl Generalization {
    pub fn new(id: impl Into<String>, subclass_id: impl Into<String>, superclass_id: impl Into<String>) -> Self {
        Generalization {
            meta: Meta::new(id),
            superclass_id: superclass_id.into(),
            subclass_id: subclass_id.into(),
        }
    }
}

impl ModelEntity for Generalization {
    const KIND: EntityKind = EntityKind::Generalization;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.subclass_id)
    }

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            Reference::new("superclass_id", EntityKind::Class, &self.superclass_id),
            Reference::new("subclass_id", EntityKind::Class, &self.subclass_id),
        ]
    }
}

/// Presentation metadata: which elements appear on a package's diagram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    #[serde(flatten)]
    pub meta: Meta,
    pub package_id: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub associations: Vec<String>,
    #[serde(default)]
    pub enumerations: Vec<String>,
    #[serde(default)]
    pub generalizations: Vec<String>,
}

impl Diagram {
    pub fn new(id: impl Into<String>, name: impl Into<String>, package_id: impl Into<String>) -> Self {
        Diagram {
            meta: Meta::named(id, name),
            package_id: package_id.into(),
            ..Default::default()
        }
    }
}

impl ModelEntity for Diagram {
    const KIND: EntityKind = EntityKind::Diagram;

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.package_id)
    }

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = vec![Reference::new("package_id", EntityKind::Package, &self.package_id)];
        refs.extend(self.classes.iter().map(|id| Reference::new("classes", EntityKind::Class, id)));
        refs.extend(
            self.associations
                .iter()
                .map(|id| Reference::new("associations", EntityKind::Association, id)),
        );
        refs.extend(
            self.enumerations
                .iter()
                .map(|id| Reference::new("enumerations", EntityKind::Enumeration, id)),
        );
        refs.extend(
            self.generalizations
                .iter()
                .map(|id| Reference::new("generalizations", EntityKind::Generalization, id)),
        );
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_is_exclusive() {
        let attr = Attribute::new("a1", "owner", "c1")
            .typed(AttributeType::Class("c2".into()));

        assert_eq!(attr.type_class_id(), Some("c2"));
        assert_eq!(attr.primitive(), None);
        assert_eq!(attr.enumeration_id(), None);

        let refs = attr.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].field, "type_class_id");
    }

    #[test]
    fn test_map_ref_leaves_primitives() {
        let prim = AttributeType::Primitive("string".into());
        assert_eq!(prim.map_ref(|_, _| "x".into()), prim);

        let en = AttributeType::Enumeration("e1".into());
        assert_eq!(
            en.map_ref(|field, id| format!("{}-{}", id, field)),
            AttributeType::Enumeration("e1-enumeration_id".into())
        );
    }

    #[test]
    fn test_body_round_trips_through_json() {
        let mut class = Class::new("c1", "Person", "p1");
        class.meta.tags.insert("bron".into(), "BRP".into());

        let json = serde_json::to_string(&class).unwrap();
        let back: Class = serde_json::from_str(&json).unwrap();

        assert_eq!(back, class);
    }

    #[test]
    fn test_minimal_body_takes_defaults() {
        let body = serde_json::json!({
            "id": "EAID_1",
            "name": "Address",
            "clazz_id": "EAID_2",
            "attr_type": { "by": "primitive", "value": "string" }
        });

        let attr: Attribute = serde_json::from_value(body).unwrap();
        assert_eq!(attr.primitive(), Some("string"));
        assert_eq!(attr.meta.schema_id, "");
        assert!(attr.meta.tags.is_empty());
    }

    #[test]
    fn test_orphan_class() {
        let orphan = Class::orphan("missing");
        assert!(orphan.is_orphan());
        assert!(!Class::new("c1", ORPHAN_CLASS_NAME, "p1").is_orphan());
    }

    #[test]
    fn test_cardinality_notation() {
        assert_eq!(Association::cardinality("1", "1"), "1");
        assert_eq!(Association::cardinality("0", "*"), "0..*");
    }
}
