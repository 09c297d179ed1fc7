use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jarfilter - annotation driven filtering of JVM archives
#[derive(Debug, Parser)]
#[command(name = "jarfilter", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the report as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Delete, stub and strip annotated classes, fields and methods of an archive.
    Filter {
        /// Path to the input archive.
        #[arg(value_name = "IN")]
        input: PathBuf,

        /// Path of the filtered archive.
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        /// Annotation to remove from the bytecode (repeatable).
        #[arg(long, value_name = "ANNOTATION")]
        strip: Vec<String>,

        /// Annotation marking classes, fields and methods to delete (repeatable).
        #[arg(long, value_name = "ANNOTATION")]
        delete: Vec<String>,

        /// Annotation marking methods whose body is replaced by a stub (repeatable).
        #[arg(long, value_name = "ANNOTATION")]
        stub: Vec<String>,

        /// Maximum number of passes over the archive.
        #[arg(long, value_name = "N", default_value_t = jarfilter::config::DEFAULT_MAX_PASSES)]
        max_passes: usize,

        /// Keep entry timestamps instead of normalising them.
        #[arg(long)]
        preserve_timestamps: bool,

        /// Process the classes of each pass in parallel.
        #[arg(long)]
        parallel: bool,
    },

    /// Remove Kotlin metadata declarations that have no counterpart in the bytecode.
    Metafix {
        /// Path to the input archive.
        #[arg(value_name = "IN")]
        input: PathBuf,

        /// Path of the repaired archive.
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        /// Keep entry timestamps instead of normalising them.
        #[arg(long)]
        preserve_timestamps: bool,
    },
}
