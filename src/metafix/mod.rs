//! Repairing Kotlin metadata of already filtered archives.
//!
//! Archives produced by other tools can contain classes whose `@kotlin.Metadata` still
//! describes functions, properties, constructors or nested classes that no longer exist.
//! [`MetaFixer`] compares each class's metadata with what the class file actually declares
//! and removes the declarations without a counterpart. Unlike [`crate::JarFilter`] it never
//! deletes anything from the bytecode and never cascades between classes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jarfilter::{config::ArchiveOptions, MetaFixer};
//! use std::path::Path;
//!
//! let report = MetaFixer::new(ArchiveOptions::new())
//!     .fix_file(Path::new("filtered.jar"), Path::new("fixed.jar"))?;
//! println!("{} classes repaired", report.fixed_classes.len());
//! # Ok::<(), jarfilter::Error>(())
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use crate::{
    archive::entries::{class_name_of, map_file, read_entries, write_entries},
    classfile::{
        attributes::{parse_inner_classes, INNER_CLASSES},
        is_class_entry, ClassFile,
    },
    config::ArchiveOptions,
    elements::{FieldElement, MethodElement},
    kotlin::{
        transform::{transform_metadata, PresentMembers},
        KotlinMetadata,
    },
    Result,
};

/// What [`MetaFixer`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaFixReport {
    /// Removed declarations, by internal class name
    pub fixed_classes: BTreeMap<String, Vec<String>>,
}

impl MetaFixReport {
    /// Total number of declarations removed.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.fixed_classes.values().map(Vec::len).sum()
    }
}

/// Removes metadata declarations that have no counterpart in their class file.
pub struct MetaFixer {
    options: ArchiveOptions,
}

impl MetaFixer {
    /// Create a fixer writing archives with `options`.
    #[must_use]
    pub fn new(options: ArchiveOptions) -> Self {
        MetaFixer { options }
    }

    /// Repair the archive at `input` and write the result to `output`.
    ///
    /// # Errors
    /// Returns an error if either file cannot be accessed or if a class cannot be decoded.
    pub fn fix_file(&self, input: &Path, output: &Path) -> Result<MetaFixReport> {
        let (bytes, report) = {
            let mapped = map_file(input)?;
            self.fix_bytes(&mapped)?
        };
        fs::write(output, bytes)?;
        Ok(report)
    }

    /// Repair an archive held in memory.
    ///
    /// # Errors
    /// Returns an error if the archive or one of its classes cannot be decoded.
    pub fn fix_bytes(&self, archive: &[u8]) -> Result<(Vec<u8>, MetaFixReport)> {
        let mut entries = read_entries(archive)?;
        let known_classes: HashSet<String> = entries
            .iter()
            .filter_map(|entry| class_name_of(&entry.name))
            .map(str::to_string)
            .collect();

        let mut report = MetaFixReport::default();
        for entry in &mut entries {
            if entry.is_dir || !is_class_entry(&entry.name) {
                continue;
            }
            if let Some((bytes, class_name, removed)) = fix_class(&entry.data, &known_classes)? {
                entry.data = bytes;
                report.fixed_classes.insert(class_name, removed);
            }
        }

        log::info!(
            "Removed {} metadata declarations from {} classes",
            report.removed_count(),
            report.fixed_classes.len()
        );

        let bytes = write_entries(&entries, self.options)?;
        Ok((bytes, report))
    }
}

/// Repair the metadata of one class.
///
/// Returns the new class bytes, the class name and the removed declarations, or `None` if
/// the metadata already matches the class.
///
/// # Errors
/// Returns an error if the class or its metadata cannot be decoded.
pub fn fix_class(
    bytes: &[u8],
    known_classes: &HashSet<String>,
) -> Result<Option<(Vec<u8>, String, Vec<String>)>> {
    let mut class = ClassFile::parse(bytes)?;
    let class_name = class.name()?.to_string();
    let Some(metadata) = KotlinMetadata::read(&class)? else {
        return Ok(None);
    };

    let fields = declared_fields(&class)?;
    let methods = declared_methods(&class)?;
    let nested = nested_classes(&class, &class_name, known_classes)?;
    let evidence = PresentMembers::new(&fields, &methods, &nested, known_classes);

    let outcome = transform_metadata(&metadata, &class_name, &evidence)?;
    let Some(d1) = outcome.d1 else {
        return Ok(None);
    };
    KotlinMetadata::replace_d1(&mut class, &d1)?;
    let removed = outcome.removed;

    log::debug!("{}: removed {} metadata declarations", class_name, removed.len());
    Ok(Some((class.to_bytes()?, class_name, removed)))
}

fn declared_fields(class: &ClassFile) -> Result<HashSet<FieldElement>> {
    class
        .fields
        .iter()
        .map(|field| {
            Ok(FieldElement::declared(
                class.member_name(field)?,
                class.member_descriptor(field)?,
            ))
        })
        .collect()
}

fn declared_methods(class: &ClassFile) -> Result<HashSet<MethodElement>> {
    class
        .methods
        .iter()
        .map(|method| {
            Ok(MethodElement::declared(
                class.member_name(method)?,
                class.member_descriptor(method)?,
                method.access,
            ))
        })
        .collect()
}

/// Classes the `InnerClasses` attribute declares as members of `class_name` whose class
/// file is still part of the archive.
fn nested_classes(
    class: &ClassFile,
    class_name: &str,
    known_classes: &HashSet<String>,
) -> Result<HashSet<String>> {
    let Some(attribute) = class.attribute(INNER_CLASSES)? else {
        return Ok(HashSet::new());
    };

    let mut nested = HashSet::new();
    for record in parse_inner_classes(&attribute.info)? {
        let outer = class
            .constant_pool
            .optional_class_name(record.outer_class_info_index)?;
        if outer != Some(class_name) {
            continue;
        }
        let inner = class.constant_pool.class_name(record.inner_class_info_index)?;
        if known_classes.contains(inner) {
            nested.insert(inner.to_string());
        }
    }
    Ok(nested)
}
