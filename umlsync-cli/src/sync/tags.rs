//! Planning tag-row writes for one record

use std::collections::BTreeMap;

use crate::external::{TagRow, TagWrite};

use super::options::TagStrategy;

/// Tag writes that bring `existing` in line with `model` under `strategy`
///
/// Only rows whose value actually changes are written, so planning against
/// the result of a previous run yields nothing.
pub fn plan_tags(strategy: TagStrategy, model: &BTreeMap<String, String>, existing: &[TagRow]) -> Vec<TagWrite> {
    match strategy {
        TagStrategy::Update => plan_merge(model, existing, false),
        TagStrategy::Upsert => plan_merge(model, existing, true),
        TagStrategy::Replace => plan_replace(model, existing),
    }
}

fn plan_merge(model: &BTreeMap<String, String>, existing: &[TagRow], write_empty: bool) -> Vec<TagWrite> {
    let mut current: BTreeMap<&str, &str> = BTreeMap::new();
    for row in existing {
        current.entry(row.name.as_str()).or_insert(row.value.as_str());
    }

    let mut writes = Vec::new();
    for (name, value) in model {
        if value.is_empty() && !write_empty {
            continue;
        }
        match current.get(name.as_str()) {
            Some(old) if *old == value.as_str() => {}
            Some(_) => writes.push(TagWrite::Update {
                name: name.clone(),
                value: value.clone(),
            }),
            None => writes.push(TagWrite::Insert {
                name: name.clone(),
                value: value.clone(),
            }),
        }
    }
    writes
}

fn plan_replace(model: &BTreeMap<String, String>, existing: &[TagRow]) -> Vec<TagWrite> {
    let mut current: Vec<(&str, &str)> = existing.iter().map(|r| (r.name.as_str(), r.value.as_str())).collect();
    current.sort_unstable();
    let wanted: Vec<(&str, &str)> = model.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    if current == wanted {
        return Vec::new();
    }

    let mut writes = Vec::with_capacity(model.len() + 1);
    if !existing.is_empty() {
        writes.push(TagWrite::DeleteAll);
    }
    writes.extend(model.iter().map(|(name, value)| TagWrite::Insert {
        name: name.clone(),
        value: value.clone(),
    }));
    writes
}
