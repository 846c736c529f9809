//! Subcommand handlers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::*;

use super::{Cli, Commands};
use crate::config::Config;
use crate::copy::{CopyOptions, GraphCopier};
use crate::model::{EntityKind, ModelEntity};
use crate::store::SchemaStore;
use crate::sync::{ReconcileOptions, ReconciliationReport, export_report_csv, reconcile_repository};
use crate::transform::{self, Transformer};

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    let database = cli.database.clone().unwrap_or_else(|| config.database.clone());
    let store = open_store(&database).await?;

    let result = match cli.command {
        Commands::Schemas => handle_schemas_command(&store).await,
        Commands::Stats { schema } => {
            let schema = config.schema_or_default(schema)?;
            handle_stats_command(&store, &schema).await
        }
        Commands::Copy {
            source,
            root,
            destination,
            materialize,
            exclude_stereotypes,
        } => {
            let options = CopyOptions {
                materialize_generalizations: materialize,
                exclude_stereotypes: exclude_stereotypes.into_iter().collect(),
            };
            handle_copy_command(&store, &source, &root, &destination, options).await
        }
        Commands::Transform {
            name,
            source,
            root,
            destination,
        } => handle_transform_command(&store, &name, &source, &root, &destination).await,
        Commands::Reconcile {
            schema,
            repository,
            tag_strategy,
            allow_insert,
            allow_delete,
            version_step,
            report,
        } => {
            let mut options = config.reconcile.clone();
            if let Some(strategy) = tag_strategy {
                options.tag_strategy = strategy;
            }
            if let Some(step) = version_step {
                options.version_step = step;
            }
            options.allow_insert |= allow_insert;
            options.allow_delete |= allow_delete;
            let report = report.map(|path| path.unwrap_or_else(|| default_report_path(&repository)));
            handle_reconcile_command(&store, &schema, &repository, &options, report.as_deref()).await
        }
        Commands::Delete { schema, kind, id } => handle_delete_command(&store, &schema, &kind, &id).await,
        Commands::Backfill { schema } => {
            let schema = config.schema_or_default(schema)?;
            handle_backfill_command(&store, &schema).await
        }
    };

    store.close().await;
    result
}

async fn open_store(database: &Path) -> Result<SchemaStore> {
    SchemaStore::open(database)
        .await
        .with_context(|| format!("Failed to open partition store: {}", database.display()))
}

pub async fn handle_schemas_command(store: &SchemaStore) -> Result<()> {
    let schemas = store.schemas().await.context("Failed to list schemas")?;

    if schemas.is_empty() {
        println!("{}", "No schemas in store".yellow());
        return Ok(());
    }

    println!("{}", "Schemas:".bold());
    for schema in schemas {
        println!("  {}", schema.cyan());
    }
    Ok(())
}

pub async fn handle_stats_command(store: &SchemaStore, schema: &str) -> Result<()> {
    let partition = store.partition(schema);
    let snapshot = partition
        .snapshot()
        .await
        .with_context(|| format!("Failed to load schema '{}'", schema))?;

    println!("{} {}", "Schema".bold(), schema.cyan());
    for kind in EntityKind::all() {
        let count = partition.count(*kind).await?;
        println!("  {:<16} {}", kind.label(), count.to_string().bright_white());
    }

    let dangling = snapshot.dangling_references();
    if dangling.is_empty() {
        println!("{}", "No dangling references".green());
    } else {
        println!();
        println!("{} {}", "Dangling references:".yellow().bold(), dangling.len());
        for reference in dangling {
            println!(
                "  {} '{}'.{} -> {} '{}'",
                reference.kind,
                reference.id,
                reference.field,
                reference.target_kind,
                reference.target_id.dimmed()
            );
        }
    }
    Ok(())
}

pub async fn handle_copy_command(
    store: &SchemaStore,
    source: &str,
    root: &str,
    destination: &str,
    options: CopyOptions,
) -> Result<()> {
    let source_partition = store.partition(source);
    let destination_partition = store.partition(destination);

    let outcome = GraphCopier::new(&source_partition, &destination_partition, options)
        .copy(root)
        .await
        .with_context(|| format!("Failed to copy package '{}' from '{}' to '{}'", root, source, destination))?;

    let stats = &outcome.stats;
    println!(
        "{} {} -> {} ({})",
        "Copied".green().bold(),
        root.cyan(),
        outcome.root.id().cyan(),
        destination
    );
    println!(
        "  {} packages, {} classes, {} attributes, {} enumerations, {} literals",
        stats.packages, stats.classes, stats.attributes, stats.enumerations, stats.literals
    );
    println!(
        "  {} associations, {} generalizations, {} diagrams",
        stats.associations, stats.generalizations, stats.diagrams
    );
    if stats.inherited_attributes + stats.inherited_associations > 0 {
        println!(
            "  {} inherited attributes, {} inherited associations",
            stats.inherited_attributes, stats.inherited_associations
        );
    }
    if stats.external_references > 0 {
        println!(
            "  {}",
            format!("{} references point outside the copied subtree", stats.external_references).yellow()
        );
    }
    Ok(())
}

pub async fn handle_transform_command(
    store: &SchemaStore,
    name: &str,
    source: &str,
    root: &str,
    destination: &str,
) -> Result<()> {
    let Some(transformer) = transform::builtin(name) else {
        anyhow::bail!(
            "Unknown transform '{}' (available: {})",
            name,
            transform::BUILTIN_TRANSFORMS.join(", ")
        );
    };

    let result = transformer
        .apply(root, &store.partition(source), &store.partition(destination))
        .await
        .with_context(|| format!("Transform '{}' failed on package '{}'", name, root))?;

    println!(
        "{} {} -> {} ({})",
        transformer.name().green().bold(),
        root.cyan(),
        result.id().cyan(),
        destination
    );
    Ok(())
}

pub async fn handle_reconcile_command(
    store: &SchemaStore,
    schema: &str,
    repository: &Path,
    options: &ReconcileOptions,
    report_path: Option<&Path>,
) -> Result<()> {
    if !repository.exists() {
        anyhow::bail!("Repository file does not exist: {}", repository.display());
    }

    let partition = store.partition(schema);
    let report = reconcile_repository(&partition, repository, options)
        .await
        .with_context(|| format!("Failed to reconcile schema '{}' into {}", schema, repository.display()))?;

    print_report(&report);

    if let Some(path) = report_path {
        export_report_csv(&report, path)?;
        println!("Report written to {}", path.display().to_string().cyan());
    }

    if let Some(failure) = &report.failure {
        anyhow::bail!("Reconciliation stopped at {}: {}", failure.kind, failure.message);
    }
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    println!("{}", "Reconciliation summary".bold());
    for line in report.summary_lines() {
        println!("  {}", line);
    }
    println!(
        "  {} inserted, {} updated, {} unchanged, {} deleted, {} version increments",
        report.inserted_count().to_string().green(),
        report.updated_count().to_string().yellow(),
        report.unchanged_count(),
        report.deleted_count().to_string().red(),
        report.version_increments()
    );
}

pub async fn handle_delete_command(store: &SchemaStore, schema: &str, kind: &str, id: &str) -> Result<()> {
    let kind: EntityKind = kind.parse().map_err(anyhow::Error::msg)?;
    let removed = store
        .partition(schema)
        .delete(kind, id)
        .await
        .with_context(|| format!("Failed to delete {} '{}'", kind, id))?;

    println!(
        "{} {} '{}' ({} rows including owned entities)",
        "Deleted".red().bold(),
        kind,
        id,
        removed
    );
    Ok(())
}

pub async fn handle_backfill_command(store: &SchemaStore, schema: &str) -> Result<()> {
    let created = store.partition(schema).backfill_orphan_ends().await?;
    if created == 0 {
        println!("{}", "Every association end resolves".green());
    } else {
        println!("Created {} placeholder classes", created.to_string().yellow());
    }
    Ok(())
}

/// Default report location next to the repository file
pub fn default_report_path(repository: &Path) -> PathBuf {
    let stem = repository
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "repository".to_string());
    repository.with_file_name(format!("{}-reconcile.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Class, Package};

    #[test]
    fn test_default_report_path() {
        assert_eq!(
            default_report_path(Path::new("/data/model.eap")),
            PathBuf::from("/data/model-reconcile.csv")
        );
    }

    #[tokio::test]
    async fn test_copy_and_delete_handlers() {
        let store = SchemaStore::in_memory().await.unwrap();
        let source = store.partition("src");
        source.save(&mut Package::new("p", "Root")).await.unwrap();
        source.save(&mut Class::new("c", "C", "p")).await.unwrap();

        handle_copy_command(&store, "src", "p", "dst", CopyOptions::default())
            .await
            .unwrap();
        assert_eq!(store.schemas().await.unwrap(), vec!["dst", "src"]);

        handle_delete_command(&store, "src", "package", "p").await.unwrap();
        assert_eq!(source.count(EntityKind::Class).await.unwrap(), 0);

        let err = handle_delete_command(&store, "src", "widget", "p").await.unwrap_err();
        assert!(err.to_string().contains("unknown entity kind"));

        let classes: Vec<Class> = store.partition("dst").all().await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_ne!(classes[0].id(), "c");
    }

    #[tokio::test]
    async fn test_unknown_transform_fails() {
        let store = SchemaStore::in_memory().await.unwrap();
        let err = handle_transform_command(&store, "scramble", "a", "p", "b")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown transform"));
    }
}
