// src/detective/mod.rs

//! Resolution failure diagnosis
//!
//! Renders a deterministic, human-readable explanation of why a module
//! failed to resolve, classifies raw resolver errors into the caller-facing
//! failure records, and suggests the closest-matching known export for
//! missing packages. Rendering degrades gracefully: a diagnosis never fails
//! and never masks the original resolution failure.

use crate::module::{BundleId, Constraint};
use crate::quasi::QuasiResolutionFailure;
use crate::solver::{ConstraintSolver, ResolverError, ResolverErrorKind, SolverState};
use tracing::debug;

/// Explains which already-resolved export a uses-conflict is against
///
/// External collaborator; returning `None` makes the detective fall back to
/// the generic uses-conflict line.
pub trait UsesConflictAnalyser {
    fn explain(&self, state: &SolverState, error: &ResolverError) -> Option<String>;
}

/// An analyser with no structured conflict data
#[derive(Debug, Default)]
pub struct NoopUsesAnalyser;

impl UsesConflictAnalyser for NoopUsesAnalyser {
    fn explain(&self, _state: &SolverState, _error: &ResolverError) -> Option<String> {
        None
    }
}

/// Produces rendered and structured explanations of resolution failures
pub struct ResolutionFailureDetective {
    uses: Box<dyn UsesConflictAnalyser + Send + Sync>,
}

impl ResolutionFailureDetective {
    pub fn new() -> Self {
        Self {
            uses: Box::new(NoopUsesAnalyser),
        }
    }

    pub fn with_uses_analyser(uses: Box<dyn UsesConflictAnalyser + Send + Sync>) -> Self {
        Self { uses }
    }

    /// Render a multi-line failure description for an unresolved module
    ///
    /// Gathers the module's own resolver errors first, then deduplicated
    /// errors of every other unresolved module for context; the full list is
    /// stored in `out_errors` for structured consumption.
    pub fn generate_failure_description(
        &self,
        solver: &dyn ConstraintSolver,
        state: &SolverState,
        module: BundleId,
        out_errors: &mut Vec<ResolverError>,
    ) -> String {
        let mut errors = solver.resolver_errors(state, module);
        for other in state.unresolved_modules() {
            if other == module {
                continue;
            }
            for error in solver.resolver_errors(state, other) {
                if !errors.contains(&error) {
                    errors.push(error);
                }
            }
        }
        out_errors.clear();
        out_errors.extend(errors.iter().cloned());

        let mut lines = vec![format!("Cannot resolve {}:", self.module_label(state, module))];

        if errors.is_empty() {
            // The solver reported nothing; list the mandatory unsatisfied
            // leaves directly.
            debug!(module, "no resolver errors; falling back to unsatisfied leaves");
            let leaves = solver.unsatisfied_leaves(state, &[module]);
            let mut rendered_any = false;
            for (_, constraint) in leaves.iter().filter(|(_, c)| c.is_mandatory()) {
                lines.push(format!(
                    "    Unsatisfied constraint: {}{}",
                    constraint,
                    self.suggestion_suffix(state, constraint)
                ));
                rendered_any = true;
            }
            if !rendered_any {
                lines.push("    The module is unresolved but no unsatisfied constraint was reported.".to_string());
            }
        } else {
            for error in &errors {
                lines.push(format!("    {}", self.render_error(state, error)));
            }
        }

        lines.join("\n")
    }

    /// Classify raw resolver errors into caller-facing failure records
    ///
    /// Only errors belonging to `module` classify; if none of them yields a
    /// package-specific record, exactly one generic record carries the
    /// rendered description.
    pub fn classify(
        &self,
        state: &SolverState,
        module: BundleId,
        errors: &[ResolverError],
        description: &str,
    ) -> Vec<QuasiResolutionFailure> {
        let identity = state
            .get(module)
            .map(|m| m.identity.clone())
            .unwrap_or_else(|| crate::module::ModuleIdentity::new("unknown", Default::default()));

        let mut failures = Vec::new();
        for error in errors.iter().filter(|e| e.module == module) {
            let Some(Constraint::ImportPackage(spec)) = &error.constraint else {
                continue;
            };
            match error.kind {
                ResolverErrorKind::ImportPackageUsesConflict => {
                    failures.push(QuasiResolutionFailure::PackageUses {
                        module: identity.clone(),
                        description: description.to_string(),
                        package: spec.package.clone(),
                        version_range: spec.version_range.clone(),
                        bundle_symbolic_name: spec.bundle_symbolic_name.clone(),
                        bundle_version_range: spec.bundle_version_range.clone(),
                    });
                }
                ResolverErrorKind::MissingImportPackage => {
                    failures.push(QuasiResolutionFailure::Package {
                        module: identity.clone(),
                        description: description.to_string(),
                        package: spec.package.clone(),
                        version_range: spec.version_range.clone(),
                        bundle_symbolic_name: spec.bundle_symbolic_name.clone(),
                        bundle_version_range: spec.bundle_version_range.clone(),
                    });
                }
                _ => {}
            }
        }

        if failures.is_empty() {
            failures.push(QuasiResolutionFailure::Generic {
                module: identity,
                description: description.to_string(),
            });
        }
        failures
    }

    fn module_label(&self, state: &SolverState, module: BundleId) -> String {
        state
            .get(module)
            .map(|m| m.identity.to_string())
            .unwrap_or_else(|| format!("bundle {}", module))
    }

    /// One rendered line per resolver error, dispatched on the error kind
    fn render_error(&self, state: &SolverState, error: &ResolverError) -> String {
        let offender = self.module_label(state, error.module);
        let constraint_text = |suffix: bool| -> String {
            match &error.constraint {
                Some(c) if suffix => format!("{}{}", c, self.suggestion_suffix(state, c)),
                Some(c) => c.to_string(),
                None => "(no constraint attached)".to_string(),
            }
        };

        match error.kind {
            ResolverErrorKind::ImportPackageUsesConflict => {
                match self.uses.explain(state, error) {
                    Some(explanation) => format!(
                        "Uses conflict: {} in {}; {}",
                        constraint_text(true),
                        offender,
                        explanation
                    ),
                    // No structured conflict data: degrade to the generic line
                    None => format!(
                        "{} reported uses conflict for import {}",
                        offender,
                        constraint_text(true)
                    ),
                }
            }
            ResolverErrorKind::MissingFragmentHost => {
                format!(
                    "Fragment {} is missing its host {}",
                    offender,
                    constraint_text(true)
                )
            }
            ResolverErrorKind::FragmentConflict => {
                let mut line = format!(
                    "Fragment {} conflicts over its host {}",
                    offender,
                    constraint_text(true)
                );
                for host in self.possible_hosts(state, error) {
                    line.push_str(&format!("; possible host {}", host));
                }
                line
            }
            kind => {
                let mut line = format!("{}: {}", offender, static_sentence(kind));
                if let Some(data) = &error.data {
                    line.push_str(&format!(" ({})", data));
                }
                if error.constraint.is_some() {
                    line.push_str(&format!(" for constraint {}", constraint_text(true)));
                }
                line
            }
        }
    }

    /// Modules whose name and version match a fragment-conflict host
    /// constraint, annotated resolved/unresolved
    fn possible_hosts(&self, state: &SolverState, error: &ResolverError) -> Vec<String> {
        let Some(Constraint::FragmentHost(spec)) = &error.constraint else {
            return Vec::new();
        };
        state
            .bundles_by_name(&spec.host_symbolic_name)
            .into_iter()
            .filter(|m| spec.version_range.includes(&m.identity.version))
            .map(|m| {
                format!(
                    "{} ({})",
                    m.identity,
                    if m.resolved { "resolved" } else { "unresolved" }
                )
            })
            .collect()
    }

    /// The "did you mean" suffix for import-package constraints
    fn suggestion_suffix(&self, state: &SolverState, constraint: &Constraint) -> String {
        let Constraint::ImportPackage(spec) = constraint else {
            return String::new();
        };
        match nearest_export(state, &spec.package) {
            Some(nearest) => format!(" -- did you mean '{}'?", nearest),
            None => String::new(),
        }
    }
}

impl Default for ResolutionFailureDetective {
    fn default() -> Self {
        Self::new()
    }
}

/// Static per-kind sentences for the remaining error kinds
fn static_sentence(kind: ResolverErrorKind) -> &'static str {
    match kind {
        ResolverErrorKind::MissingImportPackage => "missing imported package",
        ResolverErrorKind::MissingRequireBundle => "missing required bundle",
        ResolverErrorKind::SingletonSelection => {
            "another singleton with the same symbolic name was selected"
        }
        ResolverErrorKind::ImportPermissionDenied => "the bundle lacks permission to import",
        ResolverErrorKind::ExportPermissionDenied => "the exporter lacks permission to export",
        ResolverErrorKind::PlatformFilterMismatch => {
            "the platform filter did not match the running environment"
        }
        ResolverErrorKind::MissingExecutionEnvironment => {
            "none of the required execution environments is available"
        }
        ResolverErrorKind::MissingGenericCapability => "a required generic capability is missing",
        ResolverErrorKind::NativeCodeMismatch => {
            "no native code clause matched the running environment"
        }
        ResolverErrorKind::DisabledBundle => "the bundle has been disabled",
        // Fallback kept for solver versions that add new kinds
        ResolverErrorKind::ImportPackageUsesConflict
        | ResolverErrorKind::MissingFragmentHost
        | ResolverErrorKind::FragmentConflict
        | ResolverErrorKind::Unknown => "unknown resolver error",
    }
}

/// The closest-matching exported package name anywhere in the state
///
/// Case-insensitive Levenshtein distance; the minimum wins and the first
/// candidate found breaks ties. `None` when nothing is exported or the name
/// itself is already exported.
fn nearest_export(state: &SolverState, package: &str) -> Option<String> {
    let needle = package.to_lowercase();
    let mut best: Option<(String, usize)> = None;

    for (exported, _, _) in state.exported_packages() {
        let distance = levenshtein(&needle, &exported.to_lowercase());
        if best.as_ref().is_none_or(|(_, d)| distance < *d) {
            best = Some((exported, distance));
        }
    }

    match best {
        Some((_, 0)) => None,
        Some((name, _)) => Some(name),
        None => None,
    }
}

/// Levenshtein edit distance over characters
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (m, n) = (a_chars.len(), b_chars.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{
        ImportPackageSpec, ModuleDescription, ModuleManifest, PackageExport,
    };
    use crate::version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    /// Solver stub that replays scripted errors
    struct ScriptedSolver {
        errors: Vec<ResolverError>,
        leaves: Vec<(BundleId, Constraint)>,
    }

    impl ScriptedSolver {
        fn new(errors: Vec<ResolverError>) -> Self {
            Self {
                errors,
                leaves: Vec::new(),
            }
        }
    }

    impl ConstraintSolver for ScriptedSolver {
        fn resolve(&mut self, _state: &mut SolverState, _targets: &[BundleId]) -> Vec<BundleId> {
            Vec::new()
        }

        fn resolver_errors(&self, _state: &SolverState, module: BundleId) -> Vec<ResolverError> {
            self.errors
                .iter()
                .filter(|e| e.module == module)
                .cloned()
                .collect()
        }

        fn unsatisfied_leaves(
            &self,
            _state: &SolverState,
            modules: &[BundleId],
        ) -> Vec<(BundleId, Constraint)> {
            self.leaves
                .iter()
                .filter(|(id, _)| modules.contains(id))
                .cloned()
                .collect()
        }
    }

    fn exporting_module(id: BundleId, name: &str, package: &str) -> ModuleDescription {
        let manifest = ModuleManifest::new(name, v("1.0.0"))
            .export(PackageExport::new(package, v("1.0.0")));
        let mut desc = ModuleDescription::from_manifest(id, "mem:test", manifest);
        desc.resolved = true;
        desc
    }

    fn import_constraint(package: &str) -> Constraint {
        Constraint::ImportPackage(ImportPackageSpec::new(package, VersionRange::any()))
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", "abd"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_nearest_export_picks_minimum_distance() {
        let mut state = SolverState::new();
        state
            .add_module(exporting_module(1, "com.crypto", "javax.crypto.spec"))
            .unwrap();
        state
            .add_module(exporting_module(2, "com.imageio", "javax.imageio"))
            .unwrap();

        assert_eq!(
            nearest_export(&state, "javax.crypto"),
            Some("javax.crypto.spec".to_string())
        );
    }

    #[test]
    fn test_nearest_export_empty_pool() {
        let state = SolverState::new();
        assert_eq!(nearest_export(&state, "anything"), None);
    }

    #[test]
    fn test_nearest_export_skips_exact_match() {
        let mut state = SolverState::new();
        state
            .add_module(exporting_module(1, "com.a", "com.a.api"))
            .unwrap();
        assert_eq!(nearest_export(&state, "com.a.api"), None);
    }

    #[test]
    fn test_description_includes_suggestion() {
        let mut state = SolverState::new();
        state
            .add_module(exporting_module(1, "com.crypto", "javax.crypto.spec"))
            .unwrap();
        let mut failing = ModuleDescription::from_manifest(
            2,
            "mem:app",
            ModuleManifest::new("com.app", v("1.0.0")),
        );
        failing.resolved = false;
        state.add_module(failing).unwrap();

        let solver = ScriptedSolver::new(vec![
            ResolverError::new(2, ResolverErrorKind::MissingImportPackage)
                .with_constraint(import_constraint("javax.crypto")),
        ]);

        let detective = ResolutionFailureDetective::new();
        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&solver, &state, 2, &mut errors);

        assert!(description.contains("Cannot resolve com.app 1.0.0"));
        assert!(description.contains("missing imported package"));
        assert!(description.contains("did you mean 'javax.crypto.spec'?"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_description_gathers_context_errors_deduplicated() {
        let mut state = SolverState::new();
        for (id, name) in [(1, "com.a"), (2, "com.b")] {
            let desc = ModuleDescription::from_manifest(
                id,
                "mem:test",
                ModuleManifest::new(name, v("1.0.0")),
            );
            state.add_module(desc).unwrap();
        }

        let shared =
            ResolverError::new(2, ResolverErrorKind::DisabledBundle).with_data("shared context");
        let solver = ScriptedSolver::new(vec![
            ResolverError::new(1, ResolverErrorKind::MissingRequireBundle),
            shared.clone(),
            shared,
        ]);

        let detective = ResolutionFailureDetective::new();
        let mut errors = Vec::new();
        detective.generate_failure_description(&solver, &state, 1, &mut errors);

        // Own error plus the other unresolved module's error, once
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].module, 1);
        assert_eq!(errors[1].module, 2);
    }

    #[test]
    fn test_description_falls_back_to_unsatisfied_leaves() {
        let mut state = SolverState::new();
        let desc = ModuleDescription::from_manifest(
            1,
            "mem:test",
            ModuleManifest::new("com.a", v("1.0.0")),
        );
        state.add_module(desc).unwrap();

        let mut solver = ScriptedSolver::new(Vec::new());
        solver.leaves = vec![
            (1, import_constraint("com.missing.api")),
            (
                1,
                Constraint::ImportPackage(
                    ImportPackageSpec::new("com.optional.api", VersionRange::any()).optional(),
                ),
            ),
        ];

        let detective = ResolutionFailureDetective::new();
        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&solver, &state, 1, &mut errors);

        assert!(errors.is_empty());
        assert!(description.contains("Unsatisfied constraint: Import-Package com.missing.api"));
        // Optional constraints are not listed
        assert!(!description.contains("com.optional.api"));
    }

    #[test]
    fn test_fragment_conflict_lists_possible_hosts() {
        let mut state = SolverState::new();
        state
            .add_module(exporting_module(1, "com.host", "com.host.api"))
            .unwrap();
        let mut old_host = exporting_module(2, "com.host", "com.host.old");
        old_host.identity.version = v("0.5.0");
        old_host.resolved = false;
        state.add_module(old_host).unwrap();
        let fragment = ModuleDescription::from_manifest(
            3,
            "mem:fragment",
            ModuleManifest::new("com.fragment", v("1.0.0")),
        );
        state.add_module(fragment).unwrap();

        let error = ResolverError::new(3, ResolverErrorKind::FragmentConflict).with_constraint(
            Constraint::FragmentHost(crate::module::FragmentHostSpec::new(
                "com.host",
                VersionRange::parse("[0.1, 2.0)").unwrap(),
            )),
        );
        let solver = ScriptedSolver::new(vec![error]);

        let detective = ResolutionFailureDetective::new();
        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&solver, &state, 3, &mut errors);

        assert!(description.contains("possible host com.host 1.0.0 (resolved)"));
        assert!(description.contains("possible host com.host 0.5.0 (unresolved)"));
    }

    #[test]
    fn test_uses_conflict_falls_back_without_analysis() {
        let mut state = SolverState::new();
        let desc = ModuleDescription::from_manifest(
            1,
            "mem:test",
            ModuleManifest::new("com.a", v("1.0.0")),
        );
        state.add_module(desc).unwrap();

        let solver = ScriptedSolver::new(vec![
            ResolverError::new(1, ResolverErrorKind::ImportPackageUsesConflict)
                .with_constraint(import_constraint("com.shared.api")),
        ]);

        let detective = ResolutionFailureDetective::new();
        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&solver, &state, 1, &mut errors);
        assert!(description.contains("reported uses conflict for import"));
    }

    #[test]
    fn test_uses_conflict_with_analysis() {
        struct FixedAnalyser;
        impl UsesConflictAnalyser for FixedAnalyser {
            fn explain(&self, _state: &SolverState, _error: &ResolverError) -> Option<String> {
                Some("package com.shared.api is already wired to com.other 2.0.0".to_string())
            }
        }

        let mut state = SolverState::new();
        let desc = ModuleDescription::from_manifest(
            1,
            "mem:test",
            ModuleManifest::new("com.a", v("1.0.0")),
        );
        state.add_module(desc).unwrap();

        let solver = ScriptedSolver::new(vec![
            ResolverError::new(1, ResolverErrorKind::ImportPackageUsesConflict)
                .with_constraint(import_constraint("com.shared.api")),
        ]);

        let detective =
            ResolutionFailureDetective::with_uses_analyser(Box::new(FixedAnalyser));
        let mut errors = Vec::new();
        let description =
            detective.generate_failure_description(&solver, &state, 1, &mut errors);
        assert!(description.contains("already wired to com.other 2.0.0"));
    }

    #[test]
    fn test_classification_of_error_kinds() {
        let mut state = SolverState::new();
        let desc = ModuleDescription::from_manifest(
            1,
            "mem:test",
            ModuleManifest::new("com.a", v("1.0.0")),
        );
        state.add_module(desc).unwrap();
        let detective = ResolutionFailureDetective::new();

        let uses = ResolverError::new(1, ResolverErrorKind::ImportPackageUsesConflict)
            .with_constraint(import_constraint("com.x"));
        let missing = ResolverError::new(1, ResolverErrorKind::MissingImportPackage)
            .with_constraint(import_constraint("com.y"));
        let other = ResolverError::new(1, ResolverErrorKind::DisabledBundle);

        let failures = detective.classify(&state, 1, &[uses, missing], "desc");
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], QuasiResolutionFailure::PackageUses { .. }));
        assert!(matches!(failures[1], QuasiResolutionFailure::Package { .. }));

        let generic = detective.classify(&state, 1, &[other], "desc");
        assert_eq!(generic.len(), 1);
        assert!(matches!(generic[0], QuasiResolutionFailure::Generic { .. }));
    }

    #[test]
    fn test_classification_ignores_context_errors() {
        let mut state = SolverState::new();
        let desc = ModuleDescription::from_manifest(
            1,
            "mem:test",
            ModuleManifest::new("com.a", v("1.0.0")),
        );
        state.add_module(desc).unwrap();
        let detective = ResolutionFailureDetective::new();

        // An error from a different module never classifies for this one
        let foreign = ResolverError::new(9, ResolverErrorKind::MissingImportPackage)
            .with_constraint(import_constraint("com.z"));
        let failures = detective.classify(&state, 1, &[foreign], "desc");
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], QuasiResolutionFailure::Generic { .. }));
    }
}
