//! Maps plugin libraries into an execution context and builds their types.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::Result;
use isoplug_plugin_sdk::{
    descriptor::{self, DescriptorEntry, PluginDescriptor},
    Plugin, Settings,
};
use libloading::{Library, Symbol};

use crate::context::{FactoryRegistry, Instantiator, Objects, TypeTarget};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to load plugin library {path}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("{path} does not export the descriptor entry point `{entry}`")]
    MissingEntryPoint { path: PathBuf, entry: String },
    #[error("{path} was built for descriptor ABI {actual}, the host speaks {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
    #[error("{path} was built against SDK {actual}, the host uses {expected}")]
    SdkMismatch {
        path: PathBuf,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{path} does not export type `{type_name}`")]
    TypeNotExported { path: PathBuf, type_name: String },
}

/// A mapped plugin library with a validated descriptor table.
pub struct LoadedLibrary {
    path: PathBuf,
    // Points into `_library`; never handed out past the library's lifetime.
    descriptor: &'static PluginDescriptor,
    _library: Library,
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("path", &self.path)
            .field("types", &self.descriptor.types.len())
            .finish()
    }
}

impl LoadedLibrary {
    /// Maps `path` and reads the descriptor exported under `entry`, or under
    /// the default symbol.
    pub fn open(path: &Path, entry: Option<&str>) -> Result<Self, LoaderError> {
        let entry = entry.unwrap_or(descriptor::DEFAULT_ENTRY);
        // SAFETY: mapping runs the library's initializers. Plugin libraries
        // are trusted the same way the wrapper settings naming them are.
        let library = unsafe { Library::new(path) }.map_err(|source| LoaderError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: the symbol is produced by `export_plugins!`, whose signature
        // is `DescriptorEntry`; the versions are checked right below.
        let table = unsafe {
            let symbol: Symbol<DescriptorEntry> =
                library
                    .get(entry.as_bytes())
                    .map_err(|_| LoaderError::MissingEntryPoint {
                        path: path.to_path_buf(),
                        entry: entry.to_string(),
                    })?;
            symbol()
        };
        if table.abi_version != descriptor::ABI_VERSION {
            return Err(LoaderError::AbiMismatch {
                path: path.to_path_buf(),
                expected: descriptor::ABI_VERSION,
                actual: table.abi_version,
            });
        }
        if table.sdk_version != descriptor::SDK_VERSION {
            return Err(LoaderError::SdkMismatch {
                path: path.to_path_buf(),
                expected: descriptor::SDK_VERSION,
                actual: table.sdk_version,
            });
        }
        tracing::debug!(
            library = %path.display(),
            types = table.types.len(),
            "plugin library mapped"
        );
        Ok(Self {
            path: path.to_path_buf(),
            descriptor: table,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.descriptor.type_names().collect()
    }

    pub fn create(&self, type_name: &str, settings: Settings) -> Result<Box<dyn Plugin>> {
        let ty = self
            .descriptor
            .find(type_name)
            .ok_or_else(|| LoaderError::TypeNotExported {
                path: self.path.clone(),
                type_name: type_name.to_string(),
            })?;
        (ty.create)(settings)
    }
}

/// Linked-in constructors first, then the library named by the target,
/// mapped into the context that builds the object. Targets without a library
/// only ever reach the linked-in constructors.
pub struct LibraryInstantiator {
    builtin: FactoryRegistry,
}

impl LibraryInstantiator {
    pub fn new(builtin: FactoryRegistry) -> Self {
        Self { builtin }
    }

    pub fn builtin(&self) -> &FactoryRegistry {
        &self.builtin
    }
}

impl Default for LibraryInstantiator {
    fn default() -> Self {
        Self::new(FactoryRegistry::new())
    }
}

impl Instantiator for LibraryInstantiator {
    fn instantiate(
        &self,
        target: &TypeTarget,
        settings: Settings,
        objects: &mut Objects,
    ) -> Result<Box<dyn Plugin>> {
        if target.library.as_os_str().is_empty() || self.builtin.contains(&target.type_name) {
            return self.builtin.instantiate(target, settings, objects);
        }
        let library = objects.library(&target.library, target.entry.as_deref())?;
        library.create(&target.type_name, settings)
    }
}
