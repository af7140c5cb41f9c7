//! URL resolver - tarballs and plain files over HTTP(S).
//!
//! A URL names exactly one candidate. Archives are unpacked and a single
//! top-level directory is hoisted; anything else is stored as a file.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use url::Url;

use crate::core::manifest::read_package_meta;
use crate::core::{Candidate, EndpointDeclaration, PackageMeta, Signature};
use crate::sources::{FetchContext, Resolver, ResolverKind};
use crate::util::fs::{ensure_dir, hoist_single_dir};

/// A resolver for downloadable archives.
#[derive(Debug, Default)]
pub struct UrlResolver;

impl UrlResolver {
    pub fn new() -> Self {
        UrlResolver
    }

    fn download(&self, url: &Url, cx: &FetchContext<'_>) -> Result<Vec<u8>> {
        tracing::info!("Downloading {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(cx.options.fetch_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let response = client
            .get(url.clone())
            .send()
            .with_context(|| format!("failed to download {}", url))?;

        if !response.status().is_success() {
            bail!("failed to download {}: HTTP {}", url, response.status());
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }
}

impl Resolver for UrlResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Url
    }

    fn required_tool(&self) -> Option<&'static str> {
        None
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn normalize(&self, source: &str) -> Result<String> {
        let url = Url::parse(source.trim()).with_context(|| format!("invalid URL: {}", source))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported URL scheme `{}` in {}", url.scheme(), source);
        }
        Ok(url.to_string())
    }

    fn identify(&self, decl: &EndpointDeclaration) -> Result<Signature> {
        Ok(Signature::new(
            ResolverKind::Url,
            self.normalize(&decl.source)?,
            decl.target.to_string(),
        ))
    }

    fn list_available(
        &self,
        decl: &EndpointDeclaration,
        _cx: &FetchContext<'_>,
    ) -> Result<Vec<Candidate>> {
        Ok(vec![Candidate::archive(self.normalize(&decl.source)?)])
    }

    fn fetch(
        &self,
        decl: &EndpointDeclaration,
        chosen: &Candidate,
        dest: &Path,
        cx: &FetchContext<'_>,
    ) -> Result<PackageMeta> {
        let url = Url::parse(&self.normalize(&decl.source)?)?;
        let data = self.download(&url, cx)?;

        unpack(&url, &data, dest)?;

        read_package_meta(dest, dest, decl, chosen, url.as_str())
    }

    fn manifest_base(&self, _decl: &EndpointDeclaration, fetched: &Path) -> PathBuf {
        fetched.to_path_buf()
    }
}

/// How a downloaded payload is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    TarGz,
    Tar,
    File,
}

impl Payload {
    fn for_url(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Payload::TarGz
        } else if path.ends_with(".tar") {
            Payload::Tar
        } else {
            Payload::File
        }
    }
}

fn unpack(url: &Url, data: &[u8], dest: &Path) -> Result<()> {
    ensure_dir(dest)?;

    match Payload::for_url(url) {
        Payload::TarGz => {
            extract_tarball(GzDecoder::new(Cursor::new(data)), dest)
                .with_context(|| format!("failed to extract {}", url))?;
            hoist_single_dir(dest)?;
        }
        Payload::Tar => {
            extract_tarball(Cursor::new(data), dest)
                .with_context(|| format!("failed to extract {}", url))?;
            hoist_single_dir(dest)?;
        }
        Payload::File => {
            let name = url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("download");
            std::fs::write(dest.join(name), data)
                .with_context(|| format!("failed to write {}", dest.join(name).display()))?;
        }
    }

    Ok(())
}

/// Extract a tar stream into `dest`.
///
/// Entries with absolute paths or `..` components are rejected.
fn extract_tarball<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        if entry_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "tarball entry escapes destination directory: {}",
                entry_path.display()
            );
        }

        let output_path = dest.join(&entry_path);
        if let Some(parent) = output_path.parent() {
            ensure_dir(parent)?;
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory => ensure_dir(&output_path)?,
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::Symlink => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            other => {
                tracing::debug!("skipping {:?} entry {}", other, entry_path.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_hoists_top_level_dir() {
        let tmp = TempDir::new().unwrap();
        let data = tarball(&[
            ("zlib-1.3.1/Dockyard.toml", "[package]\nname = \"zlib\"\n"),
            ("zlib-1.3.1/src/zlib.c", "int z;"),
        ]);
        let url = Url::parse("https://example.com/zlib-1.3.1.tar.gz").unwrap();

        unpack(&url, &data, tmp.path()).unwrap();

        assert!(tmp.path().join("Dockyard.toml").exists());
        assert!(tmp.path().join("src/zlib.c").exists());
        assert!(!tmp.path().join("zlib-1.3.1").exists());
    }

    #[test]
    fn test_unpack_plain_file() {
        let tmp = TempDir::new().unwrap();
        let url = Url::parse("https://example.com/tools/fmt.h?raw=1").unwrap();

        unpack(&url, b"#pragma once", tmp.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(tmp.path().join("fmt.h")).unwrap(),
            "#pragma once"
        );
    }

    #[test]
    fn test_payload_detection() {
        let p = |s: &str| Payload::for_url(&Url::parse(s).unwrap());
        assert_eq!(p("https://x/a.tar.gz"), Payload::TarGz);
        assert_eq!(p("https://x/a.TGZ"), Payload::TarGz);
        assert_eq!(p("https://x/a.tar"), Payload::Tar);
        assert_eq!(p("https://x/a.zip"), Payload::File);
    }

    #[test]
    fn test_normalize_rejects_other_schemes() {
        let resolver = UrlResolver::new();
        assert!(resolver.normalize("ftp://example.com/a.tgz").is_err());
        assert_eq!(
            resolver.normalize("https://Example.com/a.tgz").unwrap(),
            "https://example.com/a.tgz"
        );
    }

    #[test]
    fn test_candidates_are_immutable() {
        let resolver = UrlResolver::new();
        let decl = EndpointDeclaration::root(
            "zlib",
            "https://example.com/zlib.tgz",
            crate::core::Target::any(),
        );
        let options = crate::resolver::ResolveOptions::new(std::env::temp_dir());
        let tools = crate::util::process::ToolSet::default();
        let cx = FetchContext {
            options: &options,
            tools: &tools,
        };

        let candidates = resolver.list_available(&decl, &cx).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(!candidates[0].is_mutable());
    }
}
