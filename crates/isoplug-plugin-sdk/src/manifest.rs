use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffix appended to a library's stem to locate its manifest.
pub const MANIFEST_SUFFIX: &str = ".plugin.json";

/// On-disk JSON manifest located next to each plugin library.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LibraryManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    /// Icon file, relative to the manifest's directory.
    #[serde(default)]
    pub icon: Option<String>,
    /// Names of other libraries whose types this one may derive from.
    #[serde(default)]
    pub references: Vec<String>,
    /// Descriptor symbol, when the library does not export the default one.
    #[serde(default)]
    pub entry: Option<String>,
    pub types: Vec<TypeManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeManifest {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    /// Base type, either `Name`, `Namespace.Name`, or `library:Namespace.Name`.
    #[serde(default)]
    pub base: Option<String>,
    /// Methods declared by this type itself.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default = "default_exported")]
    pub exported: bool,
}

fn default_exported() -> bool {
    true
}

impl TypeManifest {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    pub fn matches_name(&self, hint: &str) -> bool {
        self.name == hint || self.full_name() == hint
    }

    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

impl LibraryManifest {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn find_type(&self, name: &str) -> Option<&TypeManifest> {
        self.types.iter().find(|t| t.matches_name(name))
    }

    /// Parsed library version; missing minor/patch components are zero-filled.
    pub fn semver(&self) -> Option<semver::Version> {
        let raw = self.version.as_deref()?.trim();
        if let Ok(version) = semver::Version::parse(raw) {
            return Some(version);
        }
        let mut parts = raw.split('.').map(|p| p.parse::<u64>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().transpose().ok()?.unwrap_or(0);
        let patch = parts.next().transpose().ok()?.unwrap_or(0);
        Some(semver::Version::new(major, minor, patch))
    }
}

/// `dir/Foo.dll` -> `dir/Foo.plugin.json`.
pub fn manifest_path(library: &Path) -> PathBuf {
    let stem = library
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    library.with_file_name(format!("{stem}{MANIFEST_SUFFIX}"))
}
