//! `major.minor` version arithmetic

use super::options::VersionStep;

/// Version given to records that carry none
pub const INITIAL_VERSION: &str = "1.0";

fn parse(version: &str) -> Option<(u32, u32)> {
    let version = version.trim();
    let (major, minor) = match version.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (version, "0"),
    };
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// The next version after `current`, or `None` when `step` is `None` or the
/// stepped component is already at its maximum
///
/// A missing or unparseable version is treated as `1.0`; a bare `3` reads as `3.0`.
pub fn bump(current: Option<&str>, step: VersionStep) -> Option<String> {
    let (major, minor) = match current.and_then(parse) {
        Some(parsed) => parsed,
        None => {
            if let Some(raw) = current.filter(|v| !v.trim().is_empty()) {
                log::warn!("Unparseable version '{}', counting from {}", raw, INITIAL_VERSION);
            }
            (1, 0)
        }
    };

    let next = match step {
        VersionStep::None => return None,
        VersionStep::Minor => minor.checked_add(1).map(|minor| format!("{}.{}", major, minor)),
        VersionStep::Major => major.checked_add(1).map(|major| format!("{}.0", major)),
    };
    if next.is_none() {
        log::warn!("Version {}.{} is at its limit, leaving it unchanged", major, minor);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_minor_and_major() {
        assert_eq!(bump(Some("1.4"), VersionStep::Minor).as_deref(), Some("1.5"));
        assert_eq!(bump(Some("1.4"), VersionStep::Major).as_deref(), Some("2.0"));
        assert_eq!(bump(Some("3"), VersionStep::Minor).as_deref(), Some("3.1"));
        assert_eq!(bump(Some("1.9"), VersionStep::None), None);
    }

    #[test]
    fn test_bump_missing_or_garbage() {
        assert_eq!(bump(None, VersionStep::Minor).as_deref(), Some("1.1"));
        assert_eq!(bump(Some("draft"), VersionStep::Major).as_deref(), Some("2.0"));
        assert_eq!(bump(Some(""), VersionStep::Minor).as_deref(), Some("1.1"));
    }

    #[test]
    fn test_bump_at_limit_leaves_version() {
        assert_eq!(bump(Some("2.4294967295"), VersionStep::Minor), None);
        assert_eq!(bump(Some("4294967295.3"), VersionStep::Major), None);
        assert_eq!(bump(Some("4294967295.3"), VersionStep::Minor).as_deref(), Some("4294967295.4"));
    }
}
