//! Graph copy engine - duplicates a package subtree into a partition

use std::collections::{BTreeSet, HashSet};

use crate::error::{Result, SyncError};
use crate::identity::{IdMap, IdSpace};
use crate::model::{
    Association, Attribute, Class, Diagram, EntityKind, Enumeration,
    EnumerationLiteral, Generalization, Meta, ModelEntity, Package,
};
use crate::store::{Partition, Snapshot};

use super::hierarchy::Hierarchy;

/// Options controlling what a copy produces
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Flatten inherited attributes and associations into subclasses and drop
    /// the generalization edges
    pub materialize_generalizations: bool,
    /// Classes carrying one of these stereotypes are left out of the copy;
    /// references to them keep pointing at the source partition
    pub exclude_stereotypes: BTreeSet<String>,
}

impl CopyOptions {
    pub fn materializing() -> Self {
        CopyOptions {
            materialize_generalizations: true,
            ..Default::default()
        }
    }

    fn excludes(&self, class: &Class) -> bool {
        class
            .meta
            .stereotype
            .as_deref()
            .map(|s| self.exclude_stereotypes.iter().any(|x| x.eq_ignore_ascii_case(s)))
            .unwrap_or(false)
    }
}

/// Counts of what a copy wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub packages: usize,
    pub classes: usize,
    pub enumerations: usize,
    pub attributes: usize,
    pub literals: usize,
    pub associations: usize,
    pub generalizations: usize,
    pub diagrams: usize,
    /// Attributes added to subclasses by materialization
    pub inherited_attributes: usize,
    /// Associations added to subclasses by materialization
    pub inherited_associations: usize,
    /// Reference fields left pointing outside the copied subtree
    pub external_references: usize,
}

impl CopyStats {
    pub fn total(&self) -> usize {
        self.packages
            + self.classes
            + self.enumerations
            + self.attributes
            + self.literals
            + self.associations
            + self.generalizations
            + self.diagrams
    }
}

/// A fully built copy, not yet written anywhere
#[derive(Debug, Clone, Default)]
pub struct CopiedGraph {
    pub root_id: String,
    pub packages: Vec<Package>,
    pub classes: Vec<Class>,
    pub enumerations: Vec<Enumeration>,
    pub attributes: Vec<Attribute>,
    pub literals: Vec<EnumerationLiteral>,
    pub associations: Vec<Association>,
    pub generalizations: Vec<Generalization>,
    pub diagrams: Vec<Diagram>,
    pub stats: CopyStats,
}

impl CopiedGraph {
    pub fn root(&self) -> Option<&Package> {
        self.packages.iter().find(|p| p.id() == self.root_id)
    }
}

/// Result of a completed copy
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    pub root: Package,
    pub stats: CopyStats,
}

/// Build the copy of the subtree rooted at `root_id` in memory
///
/// All checks (root present, acyclic hierarchy) happen here, before anything
/// is written.
pub fn plan_copy(
    snapshot: &Snapshot,
    root_id: &str,
    options: &CopyOptions,
    destination_schema: &str,
) -> Result<CopiedGraph> {
    if !snapshot.packages.contains(root_id) {
        return Err(SyncError::not_found(EntityKind::Package, root_id, &snapshot.schema_id));
    }

    let package_ids = snapshot.package_subtree(root_id);

    let mut classes: Vec<&Class> = Vec::new();
    let mut enumerations: Vec<&Enumeration> = Vec::new();
    let mut diagrams: Vec<&Diagram> = Vec::new();
    for package_id in &package_ids {
        for class in snapshot.classes.owned_by(package_id) {
            if options.excludes(class) {
                log::debug!("Leaving class '{}' out of the copy (excluded stereotype)", class.id());
                continue;
            }
            classes.push(class);
        }
        enumerations.extend(snapshot.enumerations.owned_by(package_id));
        diagrams.extend(snapshot.diagrams.owned_by(package_id));
    }

    let hierarchy = if options.materialize_generalizations {
        let hierarchy = Hierarchy::build(snapshot.generalizations.iter());
        hierarchy.check_acyclic(classes.iter().map(|c| c.id()))?;
        Some(hierarchy)
    } else {
        None
    };

    // Pass 1: mint every id up front so forward references resolve
    let mut ids = IdMap::new();
    for package_id in &package_ids {
        ids.mint(package_id, IdSpace::Package);
    }
    for class in &classes {
        ids.mint(class.id(), IdSpace::Object);
        for attr in snapshot.attributes.owned_by(class.id()) {
            ids.mint(attr.id(), IdSpace::Object);
        }
        for assoc in snapshot.associations.owned_by(class.id()) {
            ids.mint(assoc.id(), IdSpace::Object);
        }
        if hierarchy.is_none() {
            for general in snapshot.generalizations.owned_by(class.id()) {
                ids.mint(general.id(), IdSpace::Object);
            }
        }
    }
    for enumeration in &enumerations {
        ids.mint(enumeration.id(), IdSpace::Object);
        for literal in snapshot.literals.owned_by(enumeration.id()) {
            ids.mint(literal.id(), IdSpace::Object);
        }
    }
    for diagram in &diagrams {
        ids.mint(diagram.id(), IdSpace::Object);
    }

    // Pass 2: build the new graph into fresh collections
    let mut graph = CopiedGraph {
        root_id: ids.resolve(root_id),
        ..Default::default()
    };
    let mut builder = Builder {
        ids: &ids,
        schema: destination_schema,
        external: 0,
    };

    for package_id in &package_ids {
        let Some(package) = snapshot.packages.get(package_id) else {
            continue;
        };
        let parent = if package_id == root_id {
            None
        } else {
            package.parent_package_id.as_deref().map(|p| builder.reference("parent_package_id", p))
        };
        graph.packages.push(Package {
            meta: builder.meta(package),
            parent_package_id: parent,
        });
    }

    for class in &classes {
        let new_class_id = ids.resolve(class.id());
        graph.classes.push(Class {
            meta: builder.meta(*class),
            package_id: class.package_id.as_deref().map(|p| builder.reference("package_id", p)),
            is_datatype: class.is_datatype,
        });

        let own_attributes = snapshot.attributes.owned_by(class.id());
        let mut names: HashSet<&str> = own_attributes.iter().filter_map(|a| a.name()).collect();
        for attr in own_attributes {
            graph.attributes.push(builder.attribute(attr, ids.resolve(attr.id()), &new_class_id));
        }
        for assoc in snapshot.associations.owned_by(class.id()) {
            graph
                .associations
                .push(builder.association(assoc, ids.resolve(assoc.id()), &new_class_id));
        }

        match &hierarchy {
            None => {
                for general in snapshot.generalizations.owned_by(class.id()) {
                    graph.generalizations.push(Generalization {
                        meta: builder.meta(general),
                        superclass_id: builder.reference("superclass_id", &general.superclass_id),
                        subclass_id: new_class_id.clone(),
                    });
                }
            }
            Some(hierarchy) => {
                for ancestor in hierarchy.ancestors(class.id()) {
                    if !snapshot.classes.contains(&ancestor) {
                        log::warn!(
                            "Superclass '{}' of '{}' is not in schema '{}'; nothing to inherit from it",
                            ancestor,
                            class.id(),
                            snapshot.schema_id
                        );
                        continue;
                    }
                    for attr in snapshot.attributes.owned_by(&ancestor) {
                        if let Some(name) = attr.name() {
                            if !names.insert(name) {
                                continue;
                            }
                        }
                        let new_id = ids.mint_detached(IdSpace::Object);
                        graph.attributes.push(builder.attribute(attr, new_id, &new_class_id));
                        graph.stats.inherited_attributes += 1;
                    }
                    for assoc in snapshot.associations.owned_by(&ancestor) {
                        let new_id = ids.mint_detached(IdSpace::Object);
                        graph.associations.push(builder.association(assoc, new_id, &new_class_id));
                        graph.stats.inherited_associations += 1;
                    }
                }
            }
        }
    }

    for enumeration in &enumerations {
        let new_enum_id = ids.resolve(enumeration.id());
        graph.enumerations.push(Enumeration {
            meta: builder.meta(*enumeration),
            package_id: enumeration
                .package_id
                .as_deref()
                .map(|p| builder.reference("package_id", p)),
        });
        for literal in snapshot.literals.owned_by(enumeration.id()) {
            graph.literals.push(EnumerationLiteral {
                meta: builder.meta(literal),
                enumeration_id: new_enum_id.clone(),
            });
        }
    }

    let materialize = hierarchy.is_some();
    for diagram in &diagrams {
        graph.diagrams.push(Diagram {
            meta: builder.meta(*diagram),
            package_id: builder.reference("package_id", &diagram.package_id),
            classes: builder.references("classes", &diagram.classes),
            associations: builder.references("associations", &diagram.associations),
            enumerations: builder.references("enumerations", &diagram.enumerations),
            generalizations: if materialize {
                Vec::new()
            } else {
                builder.references("generalizations", &diagram.generalizations)
            },
        });
    }

    graph.stats.packages = graph.packages.len();
    graph.stats.classes = graph.classes.len();
    graph.stats.enumerations = graph.enumerations.len();
    graph.stats.attributes = graph.attributes.len();
    graph.stats.literals = graph.literals.len();
    graph.stats.associations = graph.associations.len();
    graph.stats.generalizations = graph.generalizations.len();
    graph.stats.diagrams = graph.diagrams.len();
    graph.stats.external_references = builder.external;

    Ok(graph)
}

/// Rewrites metadata and references through the copy-time id map
struct Builder<'a> {
    ids: &'a IdMap,
    schema: &'a str,
    external: usize,
}

impl Builder<'_> {
    fn meta<T: ModelEntity>(&self, entity: &T) -> Meta {
        entity.meta().rekeyed(self.ids.resolve(entity.id()), self.schema)
    }

    /// Map a reference into the copy, keeping ids outside the subtree as they are
    fn reference(&mut self, field: &str, id: &str) -> String {
        match self.ids.get(id) {
            Some(new_id) => new_id.to_string(),
            None => {
                log::debug!("Reference {} -> '{}' points outside the copied subtree", field, id);
                self.external += 1;
                id.to_string()
            }
        }
    }

    fn references(&mut self, field: &str, ids: &[String]) -> Vec<String> {
        ids.iter().map(|id| self.reference(field, id)).collect()
    }

    fn attribute(&mut self, attr: &Attribute, new_id: String, class_id: &str) -> Attribute {
        let attr_type = attr.attr_type.map_ref(|field, id| self.reference(field, id));
        Attribute {
            meta: attr.meta.rekeyed(new_id, self.schema),
            clazz_id: class_id.to_string(),
            attr_type,
            length: attr.length.clone(),
            mult_start: attr.mult_start.clone(),
            mult_end: attr.mult_end.clone(),
        }
    }

    fn association(&mut self, assoc: &Association, new_id: String, src_class_id: &str) -> Association {
        Association {
            meta: assoc.meta.rekeyed(new_id, self.schema),
            src_class_id: src_class_id.to_string(),
            dst_class_id: self.reference("dst_class_id", &assoc.dst_class_id),
            ..assoc.clone()
        }
    }
}

/// Copies package subtrees from one partition into another
pub struct GraphCopier<'a> {
    source: &'a Partition,
    destination: &'a Partition,
    options: CopyOptions,
}

impl<'a> GraphCopier<'a> {
    pub fn new(source: &'a Partition, destination: &'a Partition, options: CopyOptions) -> Self {
        GraphCopier {
            source,
            destination,
            options,
        }
    }

    /// Copy the subtree rooted at `root_package_id`
    ///
    /// The source partition is only read. The destination receives the whole
    /// copy in one transaction, or nothing at all.
    pub async fn copy(&self, root_package_id: &str) -> Result<CopyOutcome> {
        let snapshot = self.source.snapshot().await?;
        let mut graph = plan_copy(&snapshot, root_package_id, &self.options, self.destination.schema_id())?;

        let mut session = self.destination.session().await?;
        session.save_all(&mut graph.packages).await?;
        session.save_all(&mut graph.classes).await?;
        session.save_all(&mut graph.enumerations).await?;
        session.save_all(&mut graph.attributes).await?;
        session.save_all(&mut graph.literals).await?;
        session.save_all(&mut graph.associations).await?;
        session.save_all(&mut graph.generalizations).await?;
        session.save_all(&mut graph.diagrams).await?;
        let written = session.commit().await?;

        let root = graph
            .root()
            .cloned()
            .ok_or_else(|| SyncError::not_found(EntityKind::Package, root_package_id, self.source.schema_id()))?;

        log::info!(
            "Copied package '{}' from '{}' to '{}' as '{}': {} rows ({} classes, {} attributes, {} associations{})",
            root_package_id,
            self.source.schema_id(),
            self.destination.schema_id(),
            root.id(),
            written,
            graph.stats.classes,
            graph.stats.attributes,
            graph.stats.associations,
            if self.options.materialize_generalizations {
                format!(", {} inherited attributes", graph.stats.inherited_attributes)
            } else {
                String::new()
            }
        );

        Ok(CopyOutcome {
            root,
            stats: graph.stats,
        })
    }
}

/// Copy a package subtree into `destination`, returning the new root package
pub async fn copy_package(
    source: &Partition,
    root_package_id: &str,
    destination: &Partition,
    materialize_generalizations: bool,
) -> Result<Package> {
    let options = CopyOptions {
        materialize_generalizations,
        ..Default::default()
    };
    let outcome = GraphCopier::new(source, destination, options)
        .copy(root_package_id)
        .await?;
    Ok(outcome.root)
}
