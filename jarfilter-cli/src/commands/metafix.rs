use std::path::Path;

use anyhow::Context;
use jarfilter::{ArchiveOptions, MetaFixer};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, TabWriter},
};

#[derive(Debug, Serialize)]
struct MetaFixSummary {
    input: String,
    output: String,
    removed: usize,
    classes: Vec<FixedClass>,
}

#[derive(Debug, Serialize)]
struct FixedClass {
    name: String,
    removed: Vec<String>,
}

pub fn run(
    input: &Path,
    output: &Path,
    preserve_timestamps: bool,
    global: &GlobalOptions,
) -> anyhow::Result<()> {
    let fixer = MetaFixer::new(ArchiveOptions::new().with_preserve_timestamps(preserve_timestamps));
    let report = fixer
        .fix_file(input, output)
        .with_context(|| format!("failed to repair archive: {}", input.display()))?;

    let summary = MetaFixSummary {
        input: input.display().to_string(),
        output: output.display().to_string(),
        removed: report.removed_count(),
        classes: report
            .fixed_classes
            .into_iter()
            .map(|(name, removed)| FixedClass { name, removed })
            .collect(),
    };

    print_output(&summary, global, |summary| {
        eprintln!("Metadata repair complete: {} -> {}", summary.input, summary.output);
        eprintln!("  Classes fixed:         {}", summary.classes.len());
        eprintln!("  Declarations removed:  {}", summary.removed);

        if summary.classes.is_empty() {
            return;
        }
        println!();
        let mut table = TabWriter::new(&["Class", "Removed"]);
        for class in &summary.classes {
            table.row(vec![class.name.clone(), class.removed.join(", ")]);
        }
        table.print();
    })
}
