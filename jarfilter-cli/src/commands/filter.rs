use std::path::Path;

use anyhow::Context;
use jarfilter::{FilterConfig, FilterReport, JarFilter};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, TabWriter},
};

#[derive(Debug, Serialize)]
struct FilterSummary {
    input: String,
    output: String,
    passes: usize,
    converged: bool,
    modified_classes: Vec<String>,
    deleted_classes: Vec<String>,
    deleted_methods: usize,
    stubbed_methods: usize,
}

pub struct FilterOptions<'a> {
    pub strip: &'a [String],
    pub delete: &'a [String],
    pub stub: &'a [String],
    pub max_passes: usize,
    pub preserve_timestamps: bool,
    pub parallel: bool,
}

pub fn run(
    input: &Path,
    output: &Path,
    opts: &FilterOptions,
    global: &GlobalOptions,
) -> anyhow::Result<()> {
    let config = FilterConfig::new()
        .with_strip(opts.strip)
        .with_delete(opts.delete)
        .with_stub(opts.stub)
        .with_max_passes(opts.max_passes)
        .with_preserve_timestamps(opts.preserve_timestamps)
        .with_parallel(opts.parallel);

    let filter = JarFilter::new(config).context("invalid filter configuration")?;
    let report = filter
        .filter_file(input, output)
        .with_context(|| format!("failed to filter archive: {}", input.display()))?;

    let summary = summarize(input, output, report);
    print_output(&summary, global, display)
}

fn summarize(input: &Path, output: &Path, report: FilterReport) -> FilterSummary {
    FilterSummary {
        input: input.display().to_string(),
        output: output.display().to_string(),
        passes: report.passes,
        converged: report.converged,
        modified_classes: report.modified_classes.into_iter().collect(),
        deleted_classes: report.deleted_classes,
        deleted_methods: report.deleted_methods,
        stubbed_methods: report.stubbed_methods,
    }
}

fn display(summary: &FilterSummary) {
    eprintln!("Filtering complete: {} -> {}", summary.input, summary.output);
    let convergence = if summary.converged {
        "converged"
    } else {
        "pass limit reached"
    };
    eprintln!("  Passes:           {} ({convergence})", summary.passes);
    eprintln!("  Classes deleted:  {}", summary.deleted_classes.len());
    eprintln!("  Classes changed:  {}", summary.modified_classes.len());
    eprintln!("  Methods deleted:  {}", summary.deleted_methods);
    eprintln!("  Methods stubbed:  {}", summary.stubbed_methods);

    if summary.deleted_classes.is_empty() && summary.modified_classes.is_empty() {
        return;
    }

    println!();
    let mut table = TabWriter::new(&["Class", "Action"]);
    for class in &summary.deleted_classes {
        table.row(vec![class.clone(), "deleted".to_string()]);
    }
    for class in &summary.modified_classes {
        table.row(vec![class.clone(), "rewritten".to_string()]);
    }
    table.print();
}
