//! Conflict resolution for several declarations of one package name.
//!
//! An explicit root declaration wins outright; transitive constraints it
//! does not satisfy only produce warnings. Root declarations that disagree
//! with each other are a conflict. Otherwise every constraint must
//! hold, and the highest candidate satisfying all of them is selected.

use crate::core::package_meta::sort_candidates;
use crate::core::{Candidate, EndpointDeclaration, Target};
use crate::resolver::report::Warning;
use crate::resolver::version::intersect_all;
use crate::resolver::ResolveError;

/// Declarations for one package name seen at one level.
#[derive(Debug, Clone)]
pub struct ConflictSet {
    pub name: String,
    pub declarations: Vec<EndpointDeclaration>,
}

impl ConflictSet {
    pub fn new(name: impl Into<String>) -> Self {
        ConflictSet {
            name: name.into(),
            declarations: Vec::new(),
        }
    }

    pub fn push(&mut self, decl: EndpointDeclaration) {
        if !self.declarations.contains(&decl) {
            self.declarations.push(decl);
        }
    }

    /// The root declaration, if the root manifest names this package.
    pub fn explicit(&self) -> Option<&EndpointDeclaration> {
        self.declarations.iter().find(|d| d.explicit)
    }

    /// The declaration whose source candidates are listed from.
    pub fn primary(&self) -> Option<&EndpointDeclaration> {
        self.explicit().or_else(|| self.declarations.first())
    }

    /// `(declarer, requirement)` for every declaration, for diagnostics.
    pub fn requirements(&self) -> Vec<(String, String)> {
        self.declarations
            .iter()
            .map(|d| (d.declared_by.clone(), d.target.to_string()))
            .collect()
    }

    /// Whether every constraint pins one and the same commit, so nothing
    /// needs to be listed.
    pub fn pinned_commit(&self) -> Option<&str> {
        let primary = self.primary()?;
        let Target::Commit(id) = &primary.target else {
            return None;
        };
        if self.explicit().is_some() {
            return Some(id);
        }
        self.declarations
            .iter()
            .all(|d| d.target == primary.target)
            .then_some(id.as_str())
    }
}

/// The outcome of conflict resolution for one name.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Declaration the package is fetched through
    pub decl: EndpointDeclaration,

    pub candidate: Candidate,

    /// Every declaration folded into this selection
    pub declarations: Vec<EndpointDeclaration>,

    pub warnings: Vec<Warning>,
}

impl Selection {
    /// Whether the root manifest chose this package.
    pub fn is_explicit(&self) -> bool {
        self.decl.explicit
    }

    pub fn declared_by(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .declarations
            .iter()
            .map(|d| d.declared_by.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Decides the single version to install for a name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        ConflictResolver
    }

    /// Pick a candidate for `set` from the primary source's `candidates`.
    pub fn resolve(
        &self,
        set: &ConflictSet,
        mut candidates: Vec<Candidate>,
    ) -> Result<Selection, ResolveError> {
        let Some(primary) = set.primary().cloned() else {
            return Err(ResolveError::NoMatchingVersion {
                package: set.name.clone(),
                requirement: String::new(),
                available: Vec::new(),
            });
        };

        sort_candidates(&mut candidates);

        if primary.explicit {
            self.check_explicit_agree(set, &primary)?;
            return self.resolve_explicit(set, primary, &candidates);
        }

        // Empty range intersection is a conflict whatever is available
        let ranges: Vec<_> = set
            .declarations
            .iter()
            .filter_map(|d| d.target.as_range())
            .collect();
        if ranges.len() > 1 && intersect_all(ranges.iter().copied()).is_empty() {
            return Err(self.conflict(set));
        }

        let chosen = candidates
            .iter()
            .find(|c| set.declarations.iter().all(|d| c.satisfies(&d.target)));

        match chosen {
            Some(candidate) => Ok(Selection {
                decl: primary,
                candidate: candidate.clone(),
                declarations: set.declarations.clone(),
                warnings: Vec::new(),
            }),
            None => {
                // Each constraint alone is satisfiable, just not together
                let each_satisfiable = set
                    .declarations
                    .iter()
                    .all(|d| candidates.iter().any(|c| c.satisfies(&d.target)));
                if set.declarations.len() > 1 && each_satisfiable {
                    Err(self.conflict(set))
                } else {
                    Err(no_match(set, &primary, &candidates))
                }
            }
        }
    }

    fn resolve_explicit(
        &self,
        set: &ConflictSet,
        primary: EndpointDeclaration,
        candidates: &[Candidate],
    ) -> Result<Selection, ResolveError> {
        let Some(candidate) = candidates.iter().find(|c| c.satisfies(&primary.target)) else {
            return Err(no_match(set, &primary, candidates));
        };

        let chosen = candidate.display_version();
        let warnings = set
            .declarations
            .iter()
            .filter(|d| !d.explicit && !candidate.satisfies(&d.target))
            .map(|d| {
                let warning =
                    Warning::shadowed(&set.name, &d.declared_by, &d.target.to_string(), &chosen);
                tracing::warn!("{}", warning);
                warning
            })
            .collect();

        Ok(Selection {
            decl: primary,
            candidate: candidate.clone(),
            declarations: set.declarations.clone(),
            warnings,
        })
    }

    /// Check a declaration found after `selection` was made.
    ///
    /// Returns a shadowed-constraint warning when an explicit selection
    /// does not satisfy it, and a conflict when a transitive one does not.
    pub fn reconcile(
        &self,
        selection: &Selection,
        decl: &EndpointDeclaration,
    ) -> Result<Option<Warning>, ResolveError> {
        if selection.candidate.satisfies(&decl.target) {
            return Ok(None);
        }

        if selection.is_explicit() {
            let warning = Warning::shadowed(
                &decl.name,
                &decl.declared_by,
                &decl.target.to_string(),
                &selection.candidate.display_version(),
            );
            tracing::warn!("{}", warning);
            return Ok(Some(warning));
        }

        let mut requirements: Vec<(String, String)> = selection
            .declarations
            .iter()
            .map(|d| (d.declared_by.clone(), d.target.to_string()))
            .collect();
        requirements.push((decl.declared_by.clone(), decl.target.to_string()));

        Err(ResolveError::VersionConflict {
            package: decl.name.clone(),
            requirements,
        })
    }

    fn check_explicit_agree(
        &self,
        set: &ConflictSet,
        primary: &EndpointDeclaration,
    ) -> Result<(), ResolveError> {
        let explicit: Vec<&EndpointDeclaration> =
            set.declarations.iter().filter(|d| d.explicit).collect();
        if explicit.iter().all(|d| d.target == primary.target) {
            return Ok(());
        }

        Err(ResolveError::VersionConflict {
            package: set.name.clone(),
            requirements: explicit
                .iter()
                .map(|d| (d.declared_by.clone(), d.target.to_string()))
                .collect(),
        })
    }

    fn conflict(&self, set: &ConflictSet) -> ResolveError {
        ResolveError::VersionConflict {
            package: set.name.clone(),
            requirements: set.requirements(),
        }
    }
}

fn no_match(
    set: &ConflictSet,
    primary: &EndpointDeclaration,
    candidates: &[Candidate],
) -> ResolveError {
    let requirement = if primary.explicit {
        primary.target.to_string()
    } else {
        set.declarations
            .iter()
            .map(|d| d.target.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    ResolveError::NoMatchingVersion {
        package: set.name.clone(),
        requirement,
        available: candidates.iter().map(Candidate::display_version).collect(),
    }
}
