//! The multi-pass archive filter.

use std::{collections::BTreeSet, fs, path::Path};

use rayon::prelude::*;

use crate::{
    archive::entries::{map_file, read_entries, write_entries, ArchiveEntry},
    classfile::is_class_entry,
    config::FilterConfig,
    filter::{ClassDisposition, ClassFilter},
    registry::UnwantedRegistry,
    Result,
};

/// Statistics about one run of [`JarFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Number of passes over the archive
    pub passes: usize,
    /// `true` if the last pass changed nothing
    pub converged: bool,
    /// Internal names of the classes rewritten in any pass
    pub modified_classes: BTreeSet<String>,
    /// Internal names of the classes left out of the output
    pub deleted_classes: Vec<String>,
    /// Number of methods deleted across the archive
    pub deleted_methods: usize,
    /// Number of methods replaced by a stub
    pub stubbed_methods: usize,
}

/// What a pass does with one entry.
enum EntryResult {
    Keep,
    Replace {
        data: Vec<u8>,
        class_name: String,
        stubbed: usize,
    },
    Drop(String),
}

/// Filters whole archives.
///
/// Every pass runs each class entry through a [`ClassFilter`]; all passes share one
/// [`UnwantedRegistry`], so a method deleted in one class makes its callers in other classes
/// unwanted on the next pass. Passes repeat until one changes nothing or
/// [`FilterConfig::max_passes`] is reached.
///
/// Sequential passes let a class see what earlier classes of the same pass deleted. With
/// [`FilterConfig::parallel`] every class of a pass sees only the deletions of earlier
/// passes, so the output does not depend on thread scheduling but discoveries within a
/// pass wait for the next one.
///
/// # Examples
///
/// ```rust,no_run
/// use jarfilter::{FilterConfig, JarFilter};
/// use std::path::Path;
///
/// let config = FilterConfig::new()
///     .with_delete(["net.corda.DeleteMe"])
///     .with_stub(["net.corda.StubMeOut"]);
/// let report = JarFilter::new(config)?.filter_file(Path::new("in.jar"), Path::new("out.jar"))?;
/// println!("{} classes deleted", report.deleted_classes.len());
/// # Ok::<(), jarfilter::Error>(())
/// ```
pub struct JarFilter {
    config: FilterConfig,
}

impl JarFilter {
    /// Create a filter for `config`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(JarFilter { config })
    }

    /// The configuration of this filter.
    #[must_use]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Filter the archive at `input` and write the result to `output`.
    ///
    /// # Errors
    /// Returns an error if either file cannot be accessed or if filtering fails.
    pub fn filter_file(&self, input: &Path, output: &Path) -> Result<FilterReport> {
        let (bytes, report) = {
            let mapped = map_file(input)?;
            self.filter_bytes(&mapped)?
        };
        fs::write(output, bytes)?;
        Ok(report)
    }

    /// Filter an archive held in memory.
    ///
    /// # Errors
    /// Returns an error if the archive or any of its classes cannot be decoded.
    pub fn filter_bytes(&self, archive: &[u8]) -> Result<(Vec<u8>, FilterReport)> {
        let registry = UnwantedRegistry::new();
        let max_passes = self.config.effective_max_passes();
        let mut entries = read_entries(archive)?;
        let mut report = FilterReport::default();

        while report.passes < max_passes {
            report.passes += 1;
            let results = self.run_pass(&entries, &registry)?;

            let mut modified = false;
            let mut next = Vec::with_capacity(entries.len());
            for (entry, result) in entries.iter().zip(results) {
                match result {
                    EntryResult::Keep => next.push(entry.clone()),
                    EntryResult::Replace {
                        data,
                        class_name,
                        stubbed,
                    } => {
                        modified = true;
                        report.stubbed_methods += stubbed;
                        report.modified_classes.insert(class_name);
                        next.push(entry.with_data(data));
                    }
                    EntryResult::Drop(class_name) => {
                        modified = true;
                        log::debug!("Leaving out {}", entry.name);
                        report.modified_classes.remove(&class_name);
                    }
                }
            }
            entries = next;

            log::info!(
                "Pass {}: {} classes deleted, {} methods deleted",
                report.passes,
                registry.class_count(),
                registry.method_count()
            );

            if !modified {
                report.converged = true;
                break;
            }
        }

        if !report.converged {
            log::warn!(
                "Archive did not converge within {} passes, keeping the last result",
                max_passes
            );
        }

        report.deleted_classes = registry.deleted_classes();
        report.deleted_methods = registry.method_count();

        let bytes = write_entries(&entries, self.config.archive)?;
        Ok((bytes, report))
    }

    fn run_pass(
        &self,
        entries: &[ArchiveEntry],
        registry: &UnwantedRegistry,
    ) -> Result<Vec<EntryResult>> {
        // Parallel classes look up deletions as they were when the pass started.
        let snapshot = self.config.parallel.then(|| registry.snapshot());
        let filter = match &snapshot {
            Some(view) => ClassFilter::with_view(&self.config.annotations, registry, view),
            None => ClassFilter::new(&self.config.annotations, registry),
        };
        let process = |entry: &ArchiveEntry| -> Result<EntryResult> {
            if entry.is_dir || !is_class_entry(&entry.name) {
                return Ok(EntryResult::Keep);
            }

            let outcome = filter.filter(&entry.data)?;
            Ok(match outcome.disposition {
                ClassDisposition::Unchanged => EntryResult::Keep,
                ClassDisposition::Deleted => EntryResult::Drop(outcome.class_name),
                ClassDisposition::Rewritten(data) => EntryResult::Replace {
                    data,
                    class_name: outcome.class_name,
                    stubbed: outcome.stubbed_methods,
                },
            })
        };

        if self.config.parallel {
            entries.par_iter().map(process).collect()
        } else {
            entries.iter().map(process).collect()
        }
    }
}
