//! Template wrapper library.
//!
//! Every capability feature expands the full native export surface of its
//! family. The synthesizer later strips what a concrete plugin does not
//! implement, so this crate never decides that itself.

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result};
use isoplug_core::{host, FactoryRegistry, Host, LibraryInstantiator, Wrapper};
use isoplug_plugin_sdk::CapabilityKind;
use tracing_subscriber::{fmt, EnvFilter};

pub mod local_fs;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Full path of the wrapper file; overrides the lookup next to the host.
pub const WRAPPER_ENV: &str = "ISOPLUG_WRAPPER";
pub const LOG_ENV: &str = "ISOPLUG_LOG";

const WRAPPER_NAME: &str = match option_env!("ISOPLUG_WRAPPER_NAME") {
    Some(name) => name,
    None => "isoplug",
};

// Picked up by the synthesizer from the disassembled template.
#[cfg(feature = "fs")]
#[used]
static CAPABILITY_FS: &[u8] = b".capability fs\n";
#[cfg(feature = "content")]
#[used]
static CAPABILITY_CONTENT: &[u8] = b".capability content\n";
#[cfg(feature = "packer")]
#[used]
static CAPABILITY_PACKER: &[u8] = b".capability packer\n";
#[cfg(feature = "lister")]
#[used]
static CAPABILITY_LISTER: &[u8] = b".capability lister\n";
#[cfg(feature = "qs")]
#[used]
static CAPABILITY_QS: &[u8] = b".capability qs\n";

static HOST: OnceLock<Host> = OnceLock::new();
static FS: OnceLock<Wrapper> = OnceLock::new();
static CONTENT: OnceLock<Wrapper> = OnceLock::new();
static PACKER: OnceLock<Wrapper> = OnceLock::new();
static LISTER: OnceLock<Wrapper> = OnceLock::new();
static QUICK_SEARCH: OnceLock<Wrapper> = OnceLock::new();

/// Plugin types linked into this wrapper.
pub fn registry() -> FactoryRegistry {
    let registry = FactoryRegistry::new();
    registry.register(local_fs::TYPE_NAME, local_fs::create);
    registry
}

/// Linked-in types first, then whatever the configured plugin library
/// exports.
pub fn instantiator() -> LibraryInstantiator {
    LibraryInstantiator::new(registry())
}

fn host_instance() -> &'static Host {
    HOST.get_or_init(|| {
        init_tracing();
        tracing::debug!(version = VERSION, "wrapper host starting");
        Host::new(Arc::new(instantiator()))
    })
}

fn init_tracing() {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).try_init().ok();
}

/// Where the wrapper file of `kind` lives.
pub fn wrapper_file(kind: CapabilityKind) -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(WRAPPER_ENV) {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe().context("failed to locate the host executable")?;
    let dir = exe
        .parent()
        .with_context(|| format!("{} has no parent folder", exe.display()))?;
    Ok(host::wrapper_path(dir, WRAPPER_NAME, kind))
}

/// The wrapper bound to `kind`, created on first use.
pub fn wrapper(kind: CapabilityKind) -> Result<&'static Wrapper> {
    let slot = match kind {
        CapabilityKind::FileSystem => &FS,
        CapabilityKind::Content => &CONTENT,
        CapabilityKind::Packer => &PACKER,
        CapabilityKind::Lister => &LISTER,
        CapabilityKind::QuickSearch => &QUICK_SEARCH,
    };
    if let Some(wrapper) = slot.get() {
        return Ok(wrapper);
    }
    let path = wrapper_file(kind)?;
    Ok(slot.get_or_init(|| Wrapper::new(host_instance().clone(), path, kind)))
}

#[cfg(feature = "fs")]
isoplug_core::fs_exports!(crate::wrapper(::isoplug_plugin_sdk::CapabilityKind::FileSystem));

#[cfg(feature = "content")]
isoplug_core::content_exports!(crate::wrapper(::isoplug_plugin_sdk::CapabilityKind::Content));

#[cfg(feature = "packer")]
isoplug_core::packer_exports!(crate::wrapper(::isoplug_plugin_sdk::CapabilityKind::Packer));

#[cfg(feature = "lister")]
isoplug_core::lister_exports!(crate::wrapper(::isoplug_plugin_sdk::CapabilityKind::Lister));

#[cfg(feature = "qs")]
isoplug_core::qs_exports!(crate::wrapper(::isoplug_plugin_sdk::CapabilityKind::QuickSearch));
