//! In-memory, indexed view of a whole partition
//!
//! Engines load a snapshot once, decide everything in memory, and only then
//! open a write session. That keeps reads and writes from interleaving on the
//! store connection and means nothing is mutated while it is being walked.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::{
    Association, Attribute, Class, Diagram, EntityKind, Enumeration, EnumerationLiteral,
    Generalization, ModelEntity, Package,
};

use super::Partition;

/// Entities of one kind with id and owner indexes
#[derive(Debug, Clone)]
pub struct Collection<T: ModelEntity> {
    items: Vec<T>,
    by_id: HashMap<String, usize>,
    by_owner: HashMap<String, Vec<usize>>,
}

impl<T: ModelEntity> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            items: Vec::new(),
            by_id: HashMap::new(),
            by_owner: HashMap::new(),
        }
    }
}

impl<T: ModelEntity> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_owner: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, item) in items.iter().enumerate() {
            by_id.insert(item.id().to_string(), idx);
            if let Some(owner) = item.owner_id() {
                by_owner.entry(owner.to_string()).or_default().push(idx);
            }
        }

        Collection {
            items,
            by_id,
            by_owner,
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Entities whose owner is `owner_id`, in storage order
    pub fn owned_by(&self, owner_id: &str) -> Vec<&T> {
        self.by_owner
            .get(owner_id)
            .map(|indexes| indexes.iter().map(|&idx| &self.items[idx]).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A reference field whose target is not present in the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub kind: EntityKind,
    pub id: String,
    pub field: &'static str,
    pub target_kind: EntityKind,
    pub target_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub schema_id: String,
    pub packages: Collection<Package>,
    pub classes: Collection<Class>,
    pub enumerations: Collection<Enumeration>,
    pub attributes: Collection<Attribute>,
    pub literals: Collection<EnumerationLiteral>,
    pub associations: Collection<Association>,
    pub generalizations: Collection<Generalization>,
    pub diagrams: Collection<Diagram>,
}

impl Snapshot {
    pub async fn load(partition: &Partition) -> Result<Self> {
        Ok(Snapshot {
            schema_id: partition.schema_id().to_string(),
            packages: Collection::new(partition.all().await?),
            classes: Collection::new(partition.all().await?),
            enumerations: Collection::new(partition.all().await?),
            attributes: Collection::new(partition.all().await?),
            literals: Collection::new(partition.all().await?),
            associations: Collection::new(partition.all().await?),
            generalizations: Collection::new(partition.all().await?),
            diagrams: Collection::new(partition.all().await?),
        })
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Package => self.packages.contains(id),
            EntityKind::Class => self.classes.contains(id),
            EntityKind::Enumeration => self.enumerations.contains(id),
            EntityKind::Attribute => self.attributes.contains(id),
            EntityKind::Literal => self.literals.contains(id),
            EntityKind::Association => self.associations.contains(id),
            EntityKind::Generalization => self.generalizations.contains(id),
            EntityKind::Diagram => self.diagrams.contains(id),
        }
    }

    /// Package ids of the subtree rooted at `root_id`, depth-first, root first
    pub fn package_subtree(&self, root_id: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root_id.to_string()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                log::warn!("Package '{}' reached twice while walking the package tree", id);
                continue;
            }
            // Push in reverse so children are visited in storage order
            let children = self.packages.owned_by(&id);
            for child in children.iter().rev() {
                stack.push(child.id().to_string());
            }
            order.push(id);
        }

        order
    }

    /// Packages with no parent, or whose parent is not in this partition
    pub fn root_packages(&self) -> Vec<&Package> {
        self.packages
            .iter()
            .filter(|p| match &p.parent_package_id {
                None => true,
                Some(parent) => !self.packages.contains(parent),
            })
            .collect()
    }

    /// Every (kind, id) removed when deleting the given entity, dependents first
    pub fn cascade(&self, kind: EntityKind, id: &str) -> Vec<(EntityKind, String)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        match kind {
            EntityKind::Package => {
                let subtree = self.package_subtree(id);
                for package_id in subtree.iter().rev() {
                    for class in self.classes.owned_by(package_id) {
                        self.cascade_class(class.id(), &mut out, &mut seen);
                    }
                    for enumeration in self.enumerations.owned_by(package_id) {
                        self.cascade_enumeration(enumeration.id(), &mut out, &mut seen);
                    }
                    for diagram in self.diagrams.owned_by(package_id) {
                        push_unique(&mut out, &mut seen, EntityKind::Diagram, diagram.id());
                    }
                    push_unique(&mut out, &mut seen, EntityKind::Package, package_id);
                }
            }
            EntityKind::Class => self.cascade_class(id, &mut out, &mut seen),
            EntityKind::Enumeration => self.cascade_enumeration(id, &mut out, &mut seen),
            other => push_unique(&mut out, &mut seen, other, id),
        }

        out
    }

    fn cascade_class(
        &self,
        class_id: &str,
        out: &mut Vec<(EntityKind, String)>,
        seen: &mut HashSet<(EntityKind, String)>,
    ) {
        for attr in self.attributes.owned_by(class_id) {
            push_unique(out, seen, EntityKind::Attribute, attr.id());
        }
        for assoc in self.associations.iter() {
            if assoc.src_class_id == class_id || assoc.dst_class_id == class_id {
                push_unique(out, seen, EntityKind::Association, assoc.id());
            }
        }
        for general in self.generalizations.iter() {
            if general.subclass_id == class_id || general.superclass_id == class_id {
                push_unique(out, seen, EntityKind::Generalization, general.id());
            }
        }
        push_unique(out, seen, EntityKind::Class, class_id);
    }

    fn cascade_enumeration(
        &self,
        enumeration_id: &str,
        out: &mut Vec<(EntityKind, String)>,
        seen: &mut HashSet<(EntityKind, String)>,
    ) {
        for literal in self.literals.owned_by(enumeration_id) {
            push_unique(out, seen, EntityKind::Literal, literal.id());
        }
        push_unique(out, seen, EntityKind::Enumeration, enumeration_id);
    }

    /// References that do not resolve inside this snapshot
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();
        collect_dangling(self, &self.packages, &mut dangling);
        collect_dangling(self, &self.classes, &mut dangling);
        collect_dangling(self, &self.enumerations, &mut dangling);
        collect_dangling(self, &self.attributes, &mut dangling);
        collect_dangling(self, &self.literals, &mut dangling);
        collect_dangling(self, &self.associations, &mut dangling);
        collect_dangling(self, &self.generalizations, &mut dangling);
        collect_dangling(self, &self.diagrams, &mut dangling);
        dangling
    }
}

fn push_unique(
    out: &mut Vec<(EntityKind, String)>,
    seen: &mut HashSet<(EntityKind, String)>,
    kind: EntityKind,
    id: &str,
) {
    if seen.insert((kind, id.to_string())) {
        out.push((kind, id.to_string()));
    }
}

fn collect_dangling<T: ModelEntity>(
    snapshot: &Snapshot,
    collection: &Collection<T>,
    out: &mut Vec<DanglingReference>,
) {
    for entity in collection.iter() {
        for reference in entity.references() {
            if !snapshot.contains(reference.kind, reference.id) {
                out.push(DanglingReference {
                    kind: T::KIND,
                    id: entity.id().to_string(),
                    field: reference.field,
                    target_kind: reference.kind,
                    target_id: reference.id.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            schema_id: "s".into(),
            packages: Collection::new(vec![
                Package::new("root", "Root"),
                Package::new("a", "A").with_parent("root"),
                Package::new("b", "B").with_parent("root"),
                Package::new("a1", "A1").with_parent("a"),
            ]),
            classes: Collection::new(vec![
                Class::new("c1", "One", "a"),
                Class::new("c2", "Two", "a1"),
                Class::new("c3", "Three", "b"),
            ]),
            attributes: Collection::new(vec![Attribute::new("at1", "x", "c1")]),
            associations: Collection::new(vec![
                Association::new("as1", "c1", "c3"),
                Association::new("as2", "c3", "missing"),
            ]),
            generalizations: Collection::new(vec![Generalization::new("g1", "c2", "c1")]),
            ..Default::default()
        }
    }

    #[test]
    fn test_package_subtree_depth_first() {
        let snap = sample();
        assert_eq!(snap.package_subtree("root"), vec!["root", "a", "a1", "b"]);
        assert_eq!(snap.package_subtree("a"), vec!["a", "a1"]);
    }

    #[test]
    fn test_cascade_package_removes_contents_first() {
        let snap = sample();

        let removed = snap.cascade(EntityKind::Package, "a");

        assert!(removed.contains(&(EntityKind::Class, "c1".to_string())));
        assert!(removed.contains(&(EntityKind::Class, "c2".to_string())));
        assert!(removed.contains(&(EntityKind::Attribute, "at1".to_string())));
        assert!(removed.contains(&(EntityKind::Association, "as1".to_string())));
        assert!(removed.contains(&(EntityKind::Generalization, "g1".to_string())));
        assert!(!removed.contains(&(EntityKind::Class, "c3".to_string())));
        assert_eq!(removed.last(), Some(&(EntityKind::Package, "a".to_string())));
    }

    #[test]
    fn test_dangling_references_reported() {
        let snap = sample();

        let dangling = snap.dangling_references();

        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].id, "as2");
        assert_eq!(dangling[0].field, "dst_class_id");
    }

    #[test]
    fn test_root_packages() {
        let snap = sample();
        let roots: Vec<_> = snap.root_packages().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(roots, vec!["root"]);
    }
}
