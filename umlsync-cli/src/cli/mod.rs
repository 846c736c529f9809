//! Command-line front-end over the copy and reconciliation engines

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::sync::{TagStrategy, VersionStep};

#[derive(Parser, Debug)]
#[command(
    name = "umlsync",
    about = "Copy, flatten and reconcile UML models held in schema partitions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Partition store database (overrides config and UMLSYNC_DATABASE)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the schema partitions in the store
    Schemas,

    /// Show entity counts and dangling references of a schema
    Stats {
        /// Schema id (defaults to the configured default schema)
        schema: Option<String>,
    },

    /// Copy a package subtree into another schema
    Copy {
        /// Source schema id
        source: String,

        /// Id of the root package to copy
        root: String,

        /// Destination schema id
        destination: String,

        /// Flatten generalizations into subclasses
        #[arg(long)]
        materialize: bool,

        /// Leave out classes with this stereotype (repeatable)
        #[arg(long = "exclude-stereotype", value_name = "STEREOTYPE")]
        exclude_stereotypes: Vec<String>,
    },

    /// Run a named built-in transform over a package subtree
    Transform {
        /// Transform name (copy, materialize)
        name: String,

        /// Source schema id
        source: String,

        /// Id of the root package
        root: String,

        /// Destination schema id
        destination: String,
    },

    /// Reconcile a schema against a vendor repository file
    Reconcile {
        /// Schema id to push from
        schema: String,

        /// Path to the vendor repository database
        repository: PathBuf,

        /// How model tags are written onto repository tag rows
        #[arg(long, value_enum)]
        tag_strategy: Option<TagStrategy>,

        /// Create repository records for unmatched model entities
        #[arg(long)]
        allow_insert: bool,

        /// Remove repository records the model no longer has
        #[arg(long)]
        allow_delete: bool,

        /// Version increment applied to updated records
        #[arg(long, value_enum)]
        version_step: Option<VersionStep>,

        /// Write the per-entity report as CSV (next to the repository when no file is given)
        #[arg(long, value_name = "FILE", num_args = 0..=1)]
        report: Option<Option<PathBuf>>,
    },

    /// Delete an entity and everything it owns
    Delete {
        /// Schema id
        schema: String,

        /// Entity kind (package, class, enumeration, attribute, literal, association, generalization, diagram)
        kind: String,

        /// Entity id
        id: String,
    },

    /// Add placeholder classes for association ends that resolve to nothing
    Backfill {
        /// Schema id (defaults to the configured default schema)
        schema: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reconcile_flags() {
        let cli = Cli::try_parse_from([
            "umlsync",
            "reconcile",
            "main",
            "model.eap",
            "--tag-strategy",
            "replace",
            "--allow-insert",
            "--version-step",
            "minor",
        ])
        .unwrap();

        match cli.command {
            Commands::Reconcile {
                schema,
                tag_strategy,
                allow_insert,
                allow_delete,
                version_step,
                ..
            } => {
                assert_eq!(schema, "main");
                assert_eq!(tag_strategy, Some(TagStrategy::Replace));
                assert!(allow_insert);
                assert!(!allow_delete);
                assert_eq!(version_step, Some(VersionStep::Minor));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_copy_with_global_flags() {
        let cli = Cli::try_parse_from([
            "umlsync",
            "copy",
            "src",
            "EAPK_1",
            "dst",
            "--materialize",
            "--exclude-stereotype",
            "external",
            "--exclude-stereotype",
            "legacy",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Copy {
                materialize,
                exclude_stereotypes,
                ..
            } => {
                assert!(materialize);
                assert_eq!(exclude_stereotypes, vec!["external", "legacy"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_report_flag_without_value() {
        let cli = Cli::try_parse_from(["umlsync", "reconcile", "s", "r.eap", "--report"]).unwrap();
        match cli.command {
            Commands::Reconcile { report, .. } => assert_eq!(report, Some(None)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_strategy_rejected() {
        assert!(Cli::try_parse_from(["umlsync", "reconcile", "s", "r", "--tag-strategy", "merge"]).is_err());
    }
}
