//! Git resolver - dependencies from version-control remotes.
//!
//! Listing uses `git ls-remote`; fetching clones into the staging
//! directory. The `git` executable is located through
//! [`locate_tool`], so a project-local `.dockyard/bin/git` wins over `PATH`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use git2::{Repository, ResetType};

use crate::core::manifest::read_package_meta;
use crate::core::{Candidate, CandidateKind, EndpointDeclaration, PackageMeta, Signature};
use crate::resolver::ResolveError;
use crate::sources::{FetchContext, Resolver, ResolverKind};
use crate::util::fs::remove_dir_all_if_exists;
use crate::util::process::{locate_tool, ProcessBuilder};

const GIT: &str = "git";

/// A resolver for git remotes.
#[derive(Debug, Default)]
pub struct GitResolver;

impl GitResolver {
    pub fn new() -> Self {
        GitResolver
    }

    fn git(&self, decl: &EndpointDeclaration, cx: &FetchContext<'_>) -> Result<ProcessBuilder> {
        if !cx.tools.has(GIT) {
            return Err(ResolveError::MissingDependencyTool {
                tool: GIT.to_string(),
                package: decl.name.clone(),
            }
            .into());
        }

        let program = locate_tool(GIT, cx.options.project_root.as_deref())
            .unwrap_or_else(|| PathBuf::from(GIT));

        Ok(ProcessBuilder::new(program).env("GIT_TERMINAL_PROMPT", "0"))
    }

    fn clone_into(
        &self,
        decl: &EndpointDeclaration,
        url: &str,
        chosen: &Candidate,
        dest: &Path,
        cx: &FetchContext<'_>,
    ) -> Result<()> {
        let timeout = cx.options.fetch_timeout;
        let dest_arg = dest.display().to_string();
        let dest_arg = dest_arg.as_str();

        match chosen.kind {
            CandidateKind::Commit => {
                tracing::info!("Cloning {} at {}", url, short(&chosen.reference));
                self.git(decl, cx)?
                    .args(["clone", "--quiet", url, dest_arg])
                    .exec_checked_with_timeout(timeout)?;

                let repo = Repository::open(dest)
                    .with_context(|| format!("failed to open clone of {}", url))?;
                let commit = repo
                    .revparse_single(&chosen.reference)
                    .and_then(|obj| obj.peel_to_commit())
                    .with_context(|| {
                        format!("commit {} not found in {}", chosen.reference, url)
                    })?;
                repo.reset(commit.as_object(), ResetType::Hard, None)?;
            }
            _ if chosen.reference == "HEAD" => {
                tracing::info!("Cloning {} (default branch)", url);
                self.git(decl, cx)?
                    .args(["clone", "--quiet", "--depth", "1", url, dest_arg])
                    .exec_checked_with_timeout(timeout)?;
            }
            _ => {
                tracing::info!("Cloning {} at {}", url, chosen.reference);
                self.git(decl, cx)?
                    .args([
                        "clone",
                        "--quiet",
                        "--depth",
                        "1",
                        "--branch",
                        chosen.reference.as_str(),
                        url,
                        dest_arg,
                    ])
                    .exec_checked_with_timeout(timeout)?;
            }
        }

        Ok(())
    }
}

impl Resolver for GitResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Git
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some(GIT)
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn normalize(&self, source: &str) -> Result<String> {
        let source = source.trim();
        let source = source.strip_prefix("git+").unwrap_or(source);
        let source = source.trim_end_matches('/');
        if source.is_empty() {
            bail!("empty git remote");
        }
        Ok(source.to_string())
    }

    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature> {
        Ok(Signature::new(
            ResolverKind::Git,
            self.normalize(&decl.source)?,
            decl.target.to_string(),
        ))
    }

    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>> {
        let url = self.normalize(&decl.source)?;
        tracing::debug!("Listing refs of {}", url);

        let output = self
            .git(decl, cx)?
            .args(["ls-remote", url.as_str()])
            .exec_checked_with_timeout(cx.options.fetch_timeout)?;

        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }

    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        cx: &FetchContext<'_>,
    ) -> Result<PackageMeta> {
        let url = self.normalize(&decl.source)?;
        self.clone_into(decl, &url, chosen, dest, cx)?;

        let precise = {
            let repo = Repository::open(dest)
                .with_context(|| format!("failed to open clone of {}", url))?;
            let head = repo.head()?.peel_to_commit()?;
            head.id().to_string()
        };

        // Only the working tree is kept
        remove_dir_all_if_exists(&dest.join(".git"))?;

        read_package_meta(dest, dest, decl, chosen, precise)
    }

    fn manifest_base(&self, _decl: &EndpointDeclaration, fetched: &Path) -> PathBuf {
        fetched.to_path_buf()
    }
}

/// Parse `git ls-remote` output into candidates.
///
/// Annotated tags appear twice; the peeled `^{}` line carries the commit.
fn parse_ls_remote(output: &str) -> Vec<Candidate> {
    let mut tags: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut branches = Vec::new();

    for line in output.lines() {
        let Some((sha, name)) = line.split_once('\t') else {
            continue;
        };
        let sha = sha.trim().to_string();

        if name == "HEAD" {
            branches.push(Candidate::branch("HEAD", Some(sha)));
        } else if let Some(branch) = name.strip_prefix("refs/heads/") {
            branches.push(Candidate::branch(branch, Some(sha)));
        } else if let Some(tag) = name.strip_prefix("refs/tags/") {
            if let Some(tag) = tag.strip_suffix("^{}") {
                tags.entry(tag.to_string())
                    .and_modify(|c| c.commit = Some(sha.clone()))
                    .or_insert_with(|| Candidate::tag(tag, Some(sha.clone())));
            } else {
                tags.entry(tag.to_string())
                    .or_insert_with(|| Candidate::tag(tag, Some(sha)));
            }
        }
    }

    tags.into_values().chain(branches).collect()
}

fn short(reference: &str) -> &str {
    &reference[..reference.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_parse_ls_remote() {
        let output = "\
1111111111111111111111111111111111111111\tHEAD
1111111111111111111111111111111111111111\trefs/heads/main
2222222222222222222222222222222222222222\trefs/tags/v1.0.0
3333333333333333333333333333333333333333\trefs/tags/v1.5.0
4444444444444444444444444444444444444444\trefs/tags/v1.5.0^{}
5555555555555555555555555555555555555555\trefs/pull/7/head
";
        let candidates = parse_ls_remote(output);
        assert_eq!(candidates.len(), 4);

        let v15 = candidates
            .iter()
            .find(|c| c.reference == "v1.5.0")
            .unwrap();
        assert_eq!(v15.version, Some(Version::new(1, 5, 0)));
        assert_eq!(
            v15.commit.as_deref(),
            Some("4444444444444444444444444444444444444444")
        );

        let main = candidates.iter().find(|c| c.reference == "main").unwrap();
        assert_eq!(main.kind, CandidateKind::Branch);
        assert!(main.is_mutable());
    }

    #[test]
    fn test_normalize() {
        let git = GitResolver::new();
        assert_eq!(
            git.normalize("git+https://example.com/repo.git/").unwrap(),
            "https://example.com/repo.git"
        );
        assert_eq!(
            git.normalize(" git@github.com:acme/json.git ").unwrap(),
            "git@github.com:acme/json.git"
        );
        assert!(git.normalize("git+").is_err());
    }
}
