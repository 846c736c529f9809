//! Entity kinds and the common metadata every model entity carries

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdSpace;

/// The kinds of entity a schema partition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Package,
    Class,
    Enumeration,
    Attribute,
    Literal,
    Association,
    Generalization,
    Diagram,
}

impl EntityKind {
    /// All kinds in dependency order (referenced kinds before referencing kinds)
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Package,
            EntityKind::Class,
            EntityKind::Enumeration,
            EntityKind::Attribute,
            EntityKind::Literal,
            EntityKind::Association,
            EntityKind::Generalization,
            EntityKind::Diagram,
        ]
    }

    /// Storage discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Class => "class",
            Self::Enumeration => "enumeration",
            Self::Attribute => "attribute",
            Self::Literal => "literal",
            Self::Association => "association",
            Self::Generalization => "generalization",
            Self::Diagram => "diagram",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Package => "Package",
            Self::Class => "Class",
            Self::Enumeration => "Enumeration",
            Self::Attribute => "Attribute",
            Self::Literal => "Literal",
            Self::Association => "Association",
            Self::Generalization => "Generalization",
            Self::Diagram => "Diagram",
        }
    }

    /// Which external identifier space this kind's ids live in
    pub fn id_space(&self) -> IdSpace {
        match self {
            Self::Package => IdSpace::Package,
            _ => IdSpace::Object,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        EntityKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

/// Columns shared by every entity, plus the free-form tag map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub id: String,
    #[serde(default)]
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereotype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Tags with no dedicated column
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Meta {
    pub fn new(id: impl Into<String>) -> Self {
        Meta {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Meta {
            id: id.into(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Copy of this metadata under a new identity and partition
    pub fn rekeyed(&self, id: impl Into<String>, schema_id: &str) -> Self {
        Meta {
            id: id.into(),
            schema_id: schema_id.to_string(),
            ..self.clone()
        }
    }
}

/// A reference field on an entity, used for closure checks and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub kind: EntityKind,
    pub id: &'a str,
}

impl<'a> Reference<'a> {
    pub fn new(field: &'static str, kind: EntityKind, id: &'a str) -> Self {
        Reference { field, kind, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_case_insensitively() {
        assert_eq!("Class".parse::<EntityKind>().unwrap(), EntityKind::Class);
        assert_eq!(" literal ".parse::<EntityKind>().unwrap(), EntityKind::Literal);
        assert!("table".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_only_packages_use_package_space() {
        for kind in EntityKind::all() {
            let expected = if *kind == EntityKind::Package {
                IdSpace::Package
            } else {
                IdSpace::Object
            };
            assert_eq!(kind.id_space(), expected);
        }
    }

    #[test]
    fn test_rekeyed_keeps_tags() {
        let mut meta = Meta::named("old", "Person");
        meta.tags.insert("owner".into(), "team-a".into());

        let copy = meta.rekeyed("new", "dest");

        assert_eq!(copy.id, "new");
        assert_eq!(copy.schema_id, "dest");
        assert_eq!(copy.name.as_deref(), Some("Person"));
        assert_eq!(copy.tags.get("owner").map(String::as_str), Some("team-a"));
    }
}
