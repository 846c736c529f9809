//! Applying parser-discovered tags to entities
//!
//! Source formats attach arbitrary key/value tags to elements. Keys with a
//! dedicated column are routed to a typed setter through a closed table per
//! entity kind; everything else is kept in the entity's tag map. The tables
//! are the complete list of supported keys, so `supported_keys` is also what
//! tests and diagnostics check against.

use super::entities::{
    Association, Attribute, AttributeType, Class, Diagram, Enumeration, EnumerationLiteral,
    Generalization, ModelEntity, Package,
};
use super::kind::Meta;

/// Where a tag ended up after application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Routed to a fixed field
    Field(&'static str),
    /// Stored in the free-form tag map
    Tag,
}

type Setter<T> = fn(&mut T, &str);

/// Keys every entity understands
const META_SETTERS: &[(&str, Setter<Meta>)] = &[
    ("alias", set_alias),
    ("author", set_author),
    ("definitie", set_definitie),
    ("phase", set_phase),
    ("status", set_status),
    ("stereotype", set_stereotype),
    ("version", set_version),
];

fn set_alias(meta: &mut Meta, value: &str) {
    meta.alias = non_empty(value);
}

fn set_author(meta: &mut Meta, value: &str) {
    meta.author = non_empty(value);
}

fn set_definitie(meta: &mut Meta, value: &str) {
    meta.definitie = non_empty(value);
}

fn set_phase(meta: &mut Meta, value: &str) {
    meta.phase = non_empty(value);
}

fn set_status(meta: &mut Meta, value: &str) {
    meta.status = non_empty(value);
}

fn set_stereotype(meta: &mut Meta, value: &str) {
    meta.stereotype = non_empty(value);
}

fn set_version(meta: &mut Meta, value: &str) {
    meta.version = non_empty(value);
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "ja")
}

/// Per-kind keys on top of the shared metadata keys
pub trait TagFields: ModelEntity {
    const SETTERS: &'static [(&'static str, Setter<Self>)];
}

impl TagFields for Package {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[];
}

impl TagFields for Class {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[("is_datatype", set_is_datatype)];
}

fn set_is_datatype(class: &mut Class, value: &str) {
    class.is_datatype = parse_flag(value);
}

impl TagFields for Attribute {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[
        ("length", set_length),
        ("mult_end", set_attr_mult_end),
        ("mult_start", set_attr_mult_start),
        ("primitive", set_primitive),
    ];
}

fn set_length(attr: &mut Attribute, value: &str) {
    attr.length = non_empty(value);
}

fn set_attr_mult_start(attr: &mut Attribute, value: &str) {
    attr.mult_start = non_empty(value);
}

fn set_attr_mult_end(attr: &mut Attribute, value: &str) {
    attr.mult_end = non_empty(value);
}

/// A primitive name only applies to attributes not already typed by a classifier
fn set_primitive(attr: &mut Attribute, value: &str) {
    if matches!(attr.attr_type, AttributeType::Untyped | AttributeType::Primitive(_)) {
        attr.attr_type = match non_empty(value) {
            Some(name) => AttributeType::Primitive(name),
            None => AttributeType::Untyped,
        };
    } else {
        log::debug!(
            "Ignoring primitive '{}' on attribute '{}' typed by a classifier",
            value,
            attr.meta.id
        );
    }
}

impl TagFields for Enumeration {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[];
}

impl TagFields for EnumerationLiteral {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[];
}

impl TagFields for Association {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[
        ("dst_mult_end", set_dst_mult_end),
        ("dst_mult_start", set_dst_mult_start),
        ("dst_role", set_dst_role),
        ("src_mult_end", set_src_mult_end),
        ("src_mult_start", set_src_mult_start),
        ("src_role", set_src_role),
    ];
}

fn set_dst_mult_end(assoc: &mut Association, value: &str) {
    assoc.dst_mult_end = value.trim().to_string();
}

fn set_dst_mult_start(assoc: &mut Association, value: &str) {
    assoc.dst_mult_start = value.trim().to_string();
}

fn set_dst_role(assoc: &mut Association, value: &str) {
    assoc.dst_role = non_empty(value);
}

fn set_src_mult_end(assoc: &mut Association, value: &str) {
    assoc.src_mult_end = value.trim().to_string();
}

fn set_src_mult_start(assoc: &mut Association, value: &str) {
    assoc.src_mult_start = value.trim().to_string();
}

fn set_src_role(assoc: &mut Association, value: &str) {
    assoc.src_role = non_empty(value);
}

impl TagFields for Generalization {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[];
}

impl TagFields for Diagram {
    const SETTERS: &'static [(&'static str, Setter<Self>)] = &[];
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Apply a single tag to an entity
pub fn apply_tag<T: TagFields>(entity: &mut T, key: &str, value: &str) -> Applied {
    let normalized = normalize_key(key);

    if let Some((name, setter)) = T::SETTERS.iter().find(|(k, _)| *k == normalized) {
        setter(entity, value);
        return Applied::Field(*name);
    }

    if let Some((name, setter)) = META_SETTERS.iter().find(|(k, _)| *k == normalized) {
        setter(entity.meta_mut(), value);
        return Applied::Field(*name);
    }

    entity
        .meta_mut()
        .tags
        .insert(key.trim().to_string(), value.to_string());
    Applied::Tag
}

/// Apply a batch of tags, returning how many landed on fixed fields
pub fn apply_tags<'a, T: TagFields>(
    entity: &mut T,
    tags: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> usize {
    tags.into_iter()
        .filter(|(k, v)| matches!(apply_tag(entity, k, v), Applied::Field(_)))
        .count()
}

/// Every key routed to a fixed field for this kind
pub fn supported_keys<T: TagFields>() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = META_SETTERS
        .iter()
        .map(|(k, _)| *k)
        .chain(T::SETTERS.iter().map(|(k, _)| *k))
        .collect();
    keys.sort_unstable();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_meta_key_sets_field() {
        let mut class = Class::new("c1", "Person", "p1");

        let applied = apply_tag(&mut class, "Author", "jan");

        assert_eq!(applied, Applied::Field("author"));
        assert_eq!(class.meta.author.as_deref(), Some("jan"));
        assert!(class.meta.tags.is_empty());
    }

    #[test]
    fn test_unknown_key_lands_in_tags() {
        let mut class = Class::new("c1", "Person", "p1");

        let applied = apply_tag(&mut class, "bron", "BRP");

        assert_eq!(applied, Applied::Tag);
        assert_eq!(class.meta.tags.get("bron").map(String::as_str), Some("BRP"));
    }

    #[test]
    fn test_kind_specific_keys() {
        let mut class = Class::new("c1", "Datum", "p1");
        assert_eq!(apply_tag(&mut class, "is-datatype", "true"), Applied::Field("is_datatype"));
        assert!(class.is_datatype);

        // Not a class key, so it is just a tag on a class
        assert_eq!(apply_tag(&mut class, "length", "10"), Applied::Tag);

        let mut attr = Attribute::new("a1", "naam", "c1");
        assert_eq!(apply_tag(&mut attr, "length", "10"), Applied::Field("length"));
        assert_eq!(attr.length.as_deref(), Some("10"));
    }

    #[test]
    fn test_primitive_does_not_override_classifier() {
        let mut attr = Attribute::new("a1", "adres", "c1")
            .typed(AttributeType::Class("c2".into()));

        apply_tag(&mut attr, "primitive", "string");

        assert_eq!(attr.type_class_id(), Some("c2"));
    }

    #[test]
    fn test_association_role_keys() {
        let mut assoc = Association::new("as1", "c1", "c2");

        let fields = apply_tags(&mut assoc, [("dst_role", "eigenaar"), ("dst_mult_end", "1"), ("note", "x")]);

        assert_eq!(fields, 2);
        assert_eq!(assoc.dst_role.as_deref(), Some("eigenaar"));
        assert_eq!(assoc.dst_mult_end, "1");
        assert_eq!(assoc.meta.tags.len(), 1);
    }

    #[test]
    fn test_supported_keys_are_closed() {
        let keys = supported_keys::<Package>();
        assert_eq!(keys, vec!["alias", "author", "definitie", "phase", "status", "stereotype", "version"]);

        let attr_keys = supported_keys::<Attribute>();
        assert!(attr_keys.contains(&"primitive"));
        assert!(!attr_keys.contains(&"is_datatype"));
    }
}
