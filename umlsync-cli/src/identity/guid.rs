//! Translation between internal ids and the vendor's brace-delimited GUIDs
//!
//! The vendor repository keys objects and packages in separate tables by the
//! same kind of GUID, e.g. `{0A1B2C3D-0000-4E5F-8899-AABBCCDDEEFF}`. Internally
//! the GUID is prefixed by its space and uses underscores, e.g.
//! `EAID_0A1B2C3D_0000_4E5F_8899_AABBCCDDEEFF` for an object and `EAPK_...`
//! for a package.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};

static EXTERNAL_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})\}$")
        .expect("valid GUID pattern")
});

static INTERNAL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(EAID|EAPK)_([0-9A-Fa-f]{8}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{4}_[0-9A-Fa-f]{12})$")
        .expect("valid internal id pattern")
});

/// Which vendor table family an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSpace {
    Object,
    Package,
}

impl IdSpace {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdSpace::Object => "EAID",
            IdSpace::Package => "EAPK",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdSpace::Object => "object",
            IdSpace::Package => "package",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "EAID" => Some(IdSpace::Object),
            "EAPK" => Some(IdSpace::Package),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IdSpace {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "object" => Ok(IdSpace::Object),
            "package" => Ok(IdSpace::Package),
            other => Err(format!("unknown id space '{}'", other)),
        }
    }
}

/// A vendor GUID in canonical upper-case, brace-delimited form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalGuid(String);

impl ExternalGuid {
    /// Parse a vendor GUID, normalizing case
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let caps = EXTERNAL_GUID
            .captures(trimmed)
            .ok_or_else(|| SyncError::invalid_id(raw, "expected {XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}"))?;
        Ok(ExternalGuid(format!("{{{}}}", caps[1].to_uppercase())))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ExternalGuid(format!("{{{}}}", uuid.hyphenated().to_string().to_uppercase()))
    }

    pub fn new_random() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare hyphenated GUID without braces
    pub fn bare(&self) -> &str {
        &self.0[1..self.0.len() - 1]
    }
}

impl std::fmt::Display for ExternalGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ExternalGuid {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        ExternalGuid::parse(&value)
    }
}

impl From<ExternalGuid> for String {
    fn from(guid: ExternalGuid) -> Self {
        guid.0
    }
}

/// Translate an internal id to its space and vendor GUID
pub fn to_external(internal_id: &str) -> Result<(IdSpace, ExternalGuid)> {
    let caps = INTERNAL_ID.captures(internal_id.trim()).ok_or_else(|| {
        SyncError::invalid_id(internal_id, "expected EAID_ or EAPK_ followed by an underscore-delimited GUID")
    })?;

    let space = IdSpace::from_prefix(&caps[1])
        .ok_or_else(|| SyncError::invalid_id(internal_id, "unknown id prefix"))?;
    let guid = format!("{{{}}}", caps[2].replace('_', "-").to_uppercase());

    Ok((space, ExternalGuid(guid)))
}

/// Translate a vendor GUID into the internal id for the given space
pub fn to_internal(guid: &ExternalGuid, space: IdSpace) -> String {
    format!("{}_{}", space.prefix(), guid.bare().replace('-', "_"))
}

/// Mint a fresh internal id in the given space
pub fn mint(space: IdSpace) -> String {
    to_internal(&ExternalGuid::new_random(), space)
}

/// Whether an id is in internal prefixed form
pub fn is_internal(id: &str) -> bool {
    INTERNAL_ID.is_match(id.trim())
}
