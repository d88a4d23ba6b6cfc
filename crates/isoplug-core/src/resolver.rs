//! Metadata-only type discovery.
//!
//! Libraries are never mapped into the process here: the resolver only reads
//! the JSON manifest that sits next to each plugin library. Referenced
//! libraries are loaded into a per-call scope that is dropped on return.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use isoplug_plugin_sdk::manifest::{self, LibraryManifest, TypeManifest, MANIFEST_SUFFIX};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to read library manifest {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed library manifest {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("library `{library}` depends on `{reference}`, which could not be found")]
    MissingDependency { library: String, reference: String },
    #[error("base type `{base}` of `{ty}` is not defined in `{library}` or its references")]
    UnknownBase {
        library: String,
        ty: String,
        base: String,
    },
    #[error("type `{0}` is its own base")]
    BaseCycle(String),
    #[error("class `{class}` implementing {contract} was not found in {library}")]
    ClassNotFound {
        class: String,
        contract: String,
        library: PathBuf,
    },
    #[error("{library} contains no exported type implementing {contract}")]
    NoContract { contract: String, library: PathBuf },
}

/// A type found in a library manifest, with its effective contract set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub library: PathBuf,
    pub name: String,
    pub full_name: String,
    /// Methods the type declares itself.
    pub methods: Vec<String>,
    /// Contracts implemented directly or through a base type.
    pub contracts: Vec<String>,
    /// Descriptor symbol named by the library manifest.
    pub entry: Option<String>,
}

impl ResolvedType {
    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    pub fn implements(&self, contract: &str) -> bool {
        self.contracts.iter().any(|c| c == contract)
    }

    pub fn matches_name(&self, hint: &str) -> bool {
        self.name == hint || self.full_name == hint
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    search_paths: Vec<PathBuf>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra directories searched for referenced libraries after the library's own.
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn load_manifest(&self, library: &Path) -> Result<LibraryManifest, ResolveError> {
        read_manifest(&manifest::manifest_path(library))
    }

    /// First exported type of `library` implementing `contract`, optionally
    /// restricted to the type named by `hint`.
    pub fn find_type(
        &self,
        library: &Path,
        contract: &str,
        hint: Option<&str>,
    ) -> Result<Option<ResolvedType>, ResolveError> {
        let found = self
            .types_implementing(library, contract)?
            .into_iter()
            .find(|ty| hint.map_or(true, |hint| ty.matches_name(hint)));
        if let Some(ty) = &found {
            tracing::debug!(
                library = %library.display(),
                contract,
                ty = %ty.full_name,
                "resolved plugin type"
            );
        }
        Ok(found)
    }

    /// All exported types implementing `contract`, in manifest order.
    pub fn types_implementing(
        &self,
        library: &Path,
        contract: &str,
    ) -> Result<Vec<ResolvedType>, ResolveError> {
        let mut scope = Scope::open(self, library)?;
        let root = Arc::clone(&scope.root);
        let mut found = Vec::new();
        for ty in root.types.iter().filter(|ty| ty.exported) {
            let contracts = scope.contracts_of(&root, ty)?;
            if contracts.iter().any(|c| c == contract) {
                found.push(ResolvedType {
                    library: library.to_path_buf(),
                    name: ty.name.clone(),
                    full_name: ty.full_name(),
                    methods: ty.methods.clone(),
                    contracts,
                    entry: root.entry.clone(),
                });
            }
        }
        Ok(found)
    }
}

fn read_manifest(path: &Path) -> Result<LibraryManifest, ResolveError> {
    let text = fs::read_to_string(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    LibraryManifest::from_json(&text).map_err(|source| ResolveError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Manifests loaded while answering one query.
struct Scope<'r> {
    resolver: &'r Resolver,
    dir: PathBuf,
    root: Arc<LibraryManifest>,
    loaded: HashMap<String, Arc<LibraryManifest>>,
}

impl<'r> Scope<'r> {
    fn open(resolver: &'r Resolver, library: &Path) -> Result<Self, ResolveError> {
        let root = Arc::new(resolver.load_manifest(library)?);
        let dir = library
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut loaded = HashMap::new();
        loaded.insert(root.name.clone(), Arc::clone(&root));
        Ok(Self {
            resolver,
            dir,
            root,
            loaded,
        })
    }

    /// Loads a referenced library, trying the library's directory then the
    /// search paths. `None` when no manifest exists anywhere.
    fn reference(&mut self, name: &str) -> Result<Option<Arc<LibraryManifest>>, ResolveError> {
        if let Some(manifest) = self.loaded.get(name) {
            return Ok(Some(Arc::clone(manifest)));
        }
        let file = format!("{name}{MANIFEST_SUFFIX}");
        let candidate = std::iter::once(&self.dir)
            .chain(self.resolver.search_paths.iter())
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file());
        let Some(path) = candidate else {
            tracing::debug!(reference = name, "referenced library manifest not found");
            return Ok(None);
        };
        let manifest = Arc::new(read_manifest(&path)?);
        self.loaded.insert(name.to_string(), Arc::clone(&manifest));
        Ok(Some(manifest))
    }

    fn contracts_of(
        &mut self,
        library: &Arc<LibraryManifest>,
        ty: &TypeManifest,
    ) -> Result<Vec<String>, ResolveError> {
        let mut contracts: Vec<String> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = (Arc::clone(library), ty.clone());
        loop {
            let (lib, ty) = current;
            if !visited.insert(format!("{}:{}", lib.name, ty.full_name())) {
                return Err(ResolveError::BaseCycle(ty.full_name()));
            }
            for contract in &ty.implements {
                if !contracts.contains(contract) {
                    contracts.push(contract.clone());
                }
            }
            let Some(base) = ty.base.as_deref() else {
                return Ok(contracts);
            };
            current = self.base_of(&lib, &ty, base)?;
        }
    }

    fn base_of(
        &mut self,
        library: &Arc<LibraryManifest>,
        ty: &TypeManifest,
        base: &str,
    ) -> Result<(Arc<LibraryManifest>, TypeManifest), ResolveError> {
        if let Some((lib_name, type_name)) = base.split_once(':') {
            let lib = self
                .reference(lib_name)?
                .ok_or_else(|| ResolveError::MissingDependency {
                    library: library.name.clone(),
                    reference: lib_name.to_string(),
                })?;
            let found = lib.find_type(type_name).cloned();
            return found
                .map(|found| (Arc::clone(&lib), found))
                .ok_or_else(|| ResolveError::UnknownBase {
                    library: lib.name.clone(),
                    ty: ty.full_name(),
                    base: base.to_string(),
                });
        }

        if let Some(found) = library.find_type(base) {
            return Ok((Arc::clone(library), found.clone()));
        }
        let mut missing = None;
        for reference in &library.references {
            match self.reference(reference)? {
                Some(lib) => {
                    if let Some(found) = lib.find_type(base) {
                        let found = found.clone();
                        return Ok((lib, found));
                    }
                }
                None => missing = Some(reference.clone()),
            }
        }
        Err(match missing {
            Some(reference) => ResolveError::MissingDependency {
                library: library.name.clone(),
                reference,
            },
            None => ResolveError::UnknownBase {
                library: library.name.clone(),
                ty: ty.full_name(),
                base: base.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_manifest;
    use serde_json::json;

    #[test]
    fn single_qualifying_type_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({"name": "Foo", "types": [
                {"name": "Helper", "namespace": "Foo"},
                {"name": "MyFs", "namespace": "Foo", "implements": ["FsPlugin"]}
            ]}),
        );
        let ty = Resolver::new().find_type(&lib, "FsPlugin", None).unwrap().unwrap();
        assert_eq!(ty.full_name, "Foo.MyFs");
    }

    #[test]
    fn no_qualifying_type_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({"name": "Foo", "types": [{"name": "Helper"}]}),
        );
        assert!(Resolver::new()
            .find_type(&lib, "FsPlugin", None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn name_hint_selects_between_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({"name": "Foo", "types": [
                {"name": "First", "namespace": "Foo", "implements": ["ContentPlugin"]},
                {"name": "Second", "namespace": "Foo", "implements": ["ContentPlugin"]}
            ]}),
        );
        let resolver = Resolver::new();
        let first = resolver.find_type(&lib, "ContentPlugin", None).unwrap().unwrap();
        assert_eq!(first.name, "First");
        let second = resolver
            .find_type(&lib, "ContentPlugin", Some("Foo.Second"))
            .unwrap()
            .unwrap();
        assert_eq!(second.name, "Second");
        assert!(resolver
            .find_type(&lib, "ContentPlugin", Some("Third"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn hidden_types_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({"name": "Foo", "types": [
                {"name": "Internal", "implements": ["FsPlugin"], "exported": false}
            ]}),
        );
        assert!(Resolver::new()
            .find_type(&lib, "FsPlugin", None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn contracts_are_inherited_from_referenced_libraries() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "Base",
            json!({"name": "Base", "types": [
                {
                    "name": "FsBase",
                    "namespace": "Base",
                    "implements": ["FsPlugin"],
                    "methods": ["find_first"]
                }
            ]}),
        );
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({"name": "Foo", "references": ["Base"], "types": [
                {"name": "MyFs", "base": "Base.FsBase", "methods": ["find_next"]}
            ]}),
        );
        let ty = Resolver::new().find_type(&lib, "FsPlugin", None).unwrap().unwrap();
        assert!(ty.declares("find_next"));
        assert!(!ty.declares("find_first"));
    }

    #[test]
    fn references_are_found_in_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        write_manifest(
            shared.path(),
            "Base",
            json!({"name": "Base", "types": [{"name": "B", "implements": ["ListerPlugin"]}]}),
        );
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({
                "name": "Foo",
                "references": ["Base"],
                "types": [{"name": "V", "base": "Base:B"}]
            }),
        );
        assert!(Resolver::new().find_type(&lib, "ListerPlugin", None).is_err());
        let resolver = Resolver::with_search_paths(vec![shared.path().to_path_buf()]);
        assert!(resolver.find_type(&lib, "ListerPlugin", None).unwrap().is_some());
    }

    #[test]
    fn unresolvable_reference_is_a_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write_manifest(
            dir.path(),
            "Foo",
            json!({
                "name": "Foo",
                "references": ["Gone"],
                "types": [{"name": "T", "base": "Other"}]
            }),
        );
        let err = Resolver::new().find_type(&lib, "FsPlugin", None).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingDependency { reference, .. } if reference == "Gone"
        ));
    }

    #[test]
    fn malformed_manifest_and_cycles_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Bad.plugin.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Resolver::new()
            .find_type(&dir.path().join("Bad.dll"), "FsPlugin", None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));

        let lib = write_manifest(
            dir.path(),
            "Loop",
            json!({"name": "Loop", "types": [
                {"name": "A", "base": "B"},
                {"name": "B", "base": "A"}
            ]}),
        );
        let err = Resolver::new().find_type(&lib, "FsPlugin", None).unwrap_err();
        assert!(matches!(err, ResolveError::BaseCycle(_)));
    }
}
