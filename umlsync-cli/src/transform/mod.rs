//! Transform hooks run between a source and a destination partition
//!
//! A transform receives the root package of a source subtree and writes its
//! result into the destination partition. The built-in transforms are copy
//! variants; anything else implements [`Transformer`] directly.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::copy::{CopyOptions, GraphCopier};
use crate::error::Result;
use crate::model::Package;
use crate::store::Partition;

#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Transform the subtree under `root_package_id`, returning the destination root
    async fn apply(&self, root_package_id: &str, source: &Partition, destination: &Partition) -> Result<Package>;
}

/// Subtree copy with configurable options
#[derive(Debug, Clone)]
pub struct CopyTransform {
    name: String,
    options: CopyOptions,
}

impl CopyTransform {
    pub fn new(name: impl Into<String>, options: CopyOptions) -> Self {
        CopyTransform {
            name: name.into(),
            options,
        }
    }

    /// Verbatim copy
    pub fn plain() -> Self {
        Self::new("copy", CopyOptions::default())
    }

    /// Copy with generalizations flattened into subclasses
    pub fn materializing() -> Self {
        Self::new("materialize", CopyOptions::materializing())
    }

    /// Copy that leaves out classes with any of the given stereotypes
    pub fn filtered(stereotypes: impl IntoIterator<Item = String>) -> Self {
        let exclude_stereotypes: BTreeSet<String> = stereotypes.into_iter().collect();
        Self::new(
            "filter",
            CopyOptions {
                exclude_stereotypes,
                ..Default::default()
            },
        )
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }
}

#[async_trait]
impl Transformer for CopyTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, root_package_id: &str, source: &Partition, destination: &Partition) -> Result<Package> {
        log::debug!("Running transform '{}' on package '{}'", self.name, root_package_id);
        let outcome = GraphCopier::new(source, destination, self.options.clone())
            .copy(root_package_id)
            .await?;
        Ok(outcome.root)
    }
}

/// Names accepted by [`builtin`]
pub const BUILTIN_TRANSFORMS: &[&str] = &["copy", "materialize"];

/// Look up a built-in transform by name
pub fn builtin(name: &str) -> Option<Box<dyn Transformer>> {
    match name.trim().to_lowercase().as_str() {
        "copy" => Some(Box::new(CopyTransform::plain())),
        "materialize" | "materialise" => Some(Box::new(CopyTransform::materializing())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Class, EntityKind, Generalization, ModelEntity};
    use crate::store::SchemaStore;

    #[test]
    fn test_builtin_lookup() {
        for name in BUILTIN_TRANSFORMS {
            assert_eq!(builtin(name).map(|t| t.name().to_string()).as_deref(), Some(*name));
        }
        assert!(builtin("Materialize").is_some());
        assert!(builtin("obfuscate").is_none());
    }

    #[tokio::test]
    async fn test_apply_through_trait_object() {
        let store = SchemaStore::in_memory().await.unwrap();
        let source = store.partition("source");
        let dest = store.partition("flat");
        source.save(&mut Package::new("p", "Root")).await.unwrap();
        source.save(&mut Class::new("a", "A", "p")).await.unwrap();
        source.save(&mut Class::new("b", "B", "p")).await.unwrap();
        source.save(&mut Generalization::new("g", "b", "a")).await.unwrap();

        let transform = builtin("materialize").unwrap();
        let root = transform.apply("p", &source, &dest).await.unwrap();

        assert_eq!(root.name(), Some("Root"));
        assert_eq!(dest.count(EntityKind::Class).await.unwrap(), 2);
        assert_eq!(dest.count(EntityKind::Generalization).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filtered_transform() {
        let store = SchemaStore::in_memory().await.unwrap();
        let source = store.partition("source");
        let dest = store.partition("out");
        source.save(&mut Package::new("p", "Root")).await.unwrap();
        let mut hidden = Class::new("h", "Hidden", "p");
        hidden.meta.stereotype = Some("internal".into());
        source.save(&mut hidden).await.unwrap();
        source.save(&mut Class::new("v", "Visible", "p")).await.unwrap();

        let transform = CopyTransform::filtered(["internal".to_string()]);
        transform.apply("p", &source, &dest).await.unwrap();

        let classes: Vec<Class> = dest.all().await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name(), Some("Visible"));
    }
}
