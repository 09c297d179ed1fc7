//! Filtering a single class file.
//!
//! [`ClassFilter::filter`] takes the bytes of one class and returns what remains of it.
//! Each visit flattens the class into [`events::ClassEvent`]s, lets the
//! [`stages::FilterStage`]s decide what is unwanted, and applies those decisions with the
//! [`rewrite::ClassRewriter`]. Decisions made late in a visit can make earlier parts of the
//! class unwanted (a method calling another method that is deleted further down), so the
//! class is visited again until a visit discovers nothing new.
//!
//! # Examples
//!
//! ```rust
//! use jarfilter::{
//!     classfile::{access::AccessFlags, builder::ClassBuilder},
//!     config::AnnotationSets,
//!     filter::{ClassDisposition, ClassFilter},
//!     registry::UnwantedRegistry,
//! };
//!
//! let bytes = ClassBuilder::new("com/example/Foo")
//!     .method_annotated(AccessFlags::PUBLIC, "bar", "()V", &["Lcom/example/DeleteMe;"], |code| {
//!         code.return_void();
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let annotations = AnnotationSets::new().with_delete(["com.example.DeleteMe"]);
//! let registry = UnwantedRegistry::new();
//! let outcome = ClassFilter::new(&annotations, &registry).filter(&bytes)?;
//! assert!(matches!(outcome.disposition, ClassDisposition::Rewritten(_)));
//! assert!(registry.contains_method("com/example/Foo", "bar", "()V"));
//! # Ok::<(), jarfilter::Error>(())
//! ```

pub mod events;
pub mod rewrite;
pub mod stages;
pub mod state;
pub mod stub;

use std::collections::HashSet;

use crate::{
    classfile::ClassFile,
    config::AnnotationSets,
    elements::{Expiring, MethodElement},
    filter::{
        events::class_events,
        rewrite::{ClassRewriter, RewritePlan},
        stages::{default_stages, run_stages, StageContext},
        state::WorkingState,
    },
    registry::UnwantedRegistry,
    Result,
};

/// Visits after which a class that keeps discovering is given up on.
const MAX_VISITS: usize = 64;

/// What happened to a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassDisposition {
    /// Nothing changed; the input bytes stay as they are
    Unchanged,
    /// The class was modified; these are its new bytes
    Rewritten(Vec<u8>),
    /// The class is wholly unwanted and must be left out
    Deleted,
}

/// The result of filtering one class.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Internal name of the class
    pub class_name: String,
    /// What to do with the class
    pub disposition: ClassDisposition,
    /// Number of visits until the class converged
    pub visits: usize,
    /// Methods deleted from the class
    pub deleted_methods: usize,
    /// Methods given a stub body
    pub stubbed_methods: usize,
}

impl FilterOutcome {
    /// Returns `true` if the class was rewritten or deleted.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.disposition != ClassDisposition::Unchanged
    }
}

/// Filters single class files against the configured annotations and the registry.
pub struct ClassFilter<'a> {
    annotations: &'a AnnotationSets,
    registry: &'a UnwantedRegistry,
    view: &'a UnwantedRegistry,
}

impl<'a> ClassFilter<'a> {
    /// Create a filter sharing `registry` with the other classes of the archive.
    #[must_use]
    pub fn new(annotations: &'a AnnotationSets, registry: &'a UnwantedRegistry) -> Self {
        ClassFilter {
            annotations,
            registry,
            view: registry,
        }
    }

    /// Create a filter that looks up deletions in `view` but records its own in `registry`.
    ///
    /// Classes filtered concurrently against the same frozen `view` cannot observe each
    /// other, so the result of a pass does not depend on the order they finish in.
    #[must_use]
    pub fn with_view(
        annotations: &'a AnnotationSets,
        registry: &'a UnwantedRegistry,
        view: &'a UnwantedRegistry,
    ) -> Self {
        ClassFilter {
            annotations,
            registry,
            view,
        }
    }

    /// Filter one class file.
    ///
    /// A deleted class is added to the registry. Otherwise the registry learns the
    /// class's final set of deleted methods, replacing whatever was recorded before.
    ///
    /// # Errors
    /// Returns an error if the class cannot be decoded, if its metadata is inconsistent, or
    /// if a constructor no longer holds an instruction the filter recorded for it.
    pub fn filter(&self, bytes: &[u8]) -> Result<FilterOutcome> {
        let mut class = ClassFile::parse(bytes)?;
        let class_name = class.name()?.to_string();
        let mut state = WorkingState::new(&class_name, self.view);
        let rewriter = ClassRewriter::new(self.annotations, self.view);
        let mut modified = false;
        let mut visits = 0;

        loop {
            visits += 1;
            state.begin_visit();

            let mut plan = RewritePlan::default();
            {
                let events = class_events(&class)?;
                let mut ctx = StageContext {
                    state: &mut state,
                    registry: self.registry,
                    view: self.view,
                    annotations: self.annotations,
                    plan: &mut plan,
                };
                run_stages(&mut default_stages(), &events, &mut ctx)?;
            }

            if state.is_class_unwanted() {
                self.registry.add_class(&class_name);
                log::debug!("{}: deleted", class_name);
                return Ok(FilterOutcome {
                    class_name,
                    disposition: ClassDisposition::Deleted,
                    visits,
                    deleted_methods: 0,
                    stubbed_methods: 0,
                });
            }

            let summary = rewriter.rewrite(&mut class, &state, &plan)?;
            modified |= summary.changed;
            for method in summary.extra_methods {
                state.mark_method_deleted(method);
            }
            for field in summary.extra_fields {
                state.mark_field(field);
            }

            if !state.discovered() || !state.has_marks() {
                break;
            }
            if visits >= MAX_VISITS {
                log::warn!(
                    "{}: still changing after {} visits, keeping the last result",
                    class_name,
                    visits
                );
                break;
            }
            state.drain();
        }

        let stubbed_methods = state.stubbed_methods().len();
        // Only methods the class actually declared outlive this class.
        let deleted_methods: HashSet<MethodElement> = state
            .into_deleted_methods()
            .into_iter()
            .filter(|method| method.is_confirmed())
            .collect();
        let deleted_count = deleted_methods.len();
        self.registry.update_methods(&class_name, deleted_methods);

        let disposition = if modified {
            log::debug!("{}: rewritten after {} visit(s)", class_name, visits);
            ClassDisposition::Rewritten(class.to_bytes()?)
        } else {
            ClassDisposition::Unchanged
        };

        Ok(FilterOutcome {
            class_name,
            disposition,
            visits,
            deleted_methods: deleted_count,
            stubbed_methods,
        })
    }
}
