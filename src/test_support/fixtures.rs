//! On-disk package fixtures.

use std::path::{Path, PathBuf};

use crate::core::MANIFEST_NAME;

/// A local package with a `Dockyard.toml`, written under a directory.
#[derive(Debug, Clone)]
pub struct PackageFixture {
    pub name: String,
    pub version: Option<String>,
    /// `(name, TOML value)` pairs, e.g. `("util", "{ source = \"../util\" }")`
    pub deps: Vec<(String, String)>,
    pub files: Vec<(PathBuf, String)>,
}

impl PackageFixture {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageFixture {
            name: name.into(),
            version: Some(version.into()),
            deps: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Leave `package.version` out of the manifest.
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Add a dependency; `value` is written verbatim as the TOML value.
    pub fn dep(mut self, name: &str, value: &str) -> Self {
        self.deps.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a path dependency on a sibling directory.
    pub fn path_dep(self, name: &str, relative: &str) -> Self {
        let value = format!("{{ source = \"{}\" }}", relative);
        self.dep(name, &value)
    }

    pub fn file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    pub fn manifest(&self) -> String {
        let mut out = format!("[package]\nname = \"{}\"\n", self.name);
        if let Some(version) = &self.version {
            out.push_str(&format!("version = \"{}\"\n", version));
        }
        if !self.deps.is_empty() {
            out.push_str("\n[dependencies]\n");
            for (name, value) in &self.deps {
                out.push_str(&format!("{} = {}\n", name, value));
            }
        }
        out
    }

    /// Write the package to `<root>/<name>` and return that directory.
    pub fn write(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.name);
        std::fs::create_dir_all(&dir).expect("failed to create fixture dir");
        std::fs::write(dir.join(MANIFEST_NAME), self.manifest()).expect("failed to write manifest");

        for (path, contents) in &self.files {
            let path = dir.join(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("failed to create fixture dir");
            }
            std::fs::write(path, contents).expect("failed to write fixture file");
        }

        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RawManifest;
    use tempfile::TempDir;

    #[test]
    fn test_fixture_manifest_parses() {
        let tmp = TempDir::new().unwrap();
        let dir = PackageFixture::new("app", "1.0.0")
            .path_dep("util", "../util")
            .dep("zlib", "\"^1.2\"")
            .file("src/main.c", "int main(void) { return 0; }")
            .write(tmp.path());

        let manifest = RawManifest::load(&dir.join(MANIFEST_NAME)).unwrap();
        assert_eq!(manifest.name(), Some("app"));
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(dir.join("src/main.c").is_file());
    }
}
