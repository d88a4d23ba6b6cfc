use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use isoplug_plugin_sdk::{CapabilityKind, Settings};
use uuid::Uuid;

use crate::{
    callbacks::CallbackTable,
    context::{ExecutionContext, RemoteRef},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeStatus {
    NotLoaded,
    Active,
    Expired,
    Unloaded,
}

/// Crypto callback parameters assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoParams {
    pub number: i32,
    pub flags: i32,
}

/// Identity of one loaded plugin instance.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub id: Uuid,
    pub buffer_name: String,
    pub wrapper_path: PathBuf,
    pub library_path: PathBuf,
    pub kind: CapabilityKind,
    pub type_name: String,
    pub title: String,
    pub settings: Settings,
    pub plugin_number: i32,
    pub crypto: Option<CryptoParams>,
}

/// Proxies to the plugin object, and to its content companion for file
/// systems. `content_shared` marks a content proxy pointing at the primary
/// object itself.
#[derive(Debug, Clone)]
pub struct PluginHandle {
    pub primary: RemoteRef,
    pub content: Option<RemoteRef>,
    pub content_shared: bool,
}

#[derive(Debug)]
pub struct RecordState {
    pub descriptor: PluginDescriptor,
    pub plugin: Option<PluginHandle>,
    pub context: Option<ExecutionContext>,
    pub lifetime: LifetimeStatus,
    pub unload_expired: bool,
}

/// Per-wrapper bookkeeping. Records are never removed once registered.
#[derive(Debug)]
pub struct LoadingRecord {
    wrapper_path: PathBuf,
    state: Mutex<RecordState>,
    callbacks: Mutex<CallbackTable>,
}

impl LoadingRecord {
    pub fn new(
        descriptor: PluginDescriptor,
        plugin: PluginHandle,
        context: ExecutionContext,
    ) -> Self {
        let unload_expired = descriptor.settings.flag_or("unload_expired", true);
        Self {
            wrapper_path: descriptor.wrapper_path.clone(),
            state: Mutex::new(RecordState {
                descriptor,
                plugin: Some(plugin),
                context: Some(context),
                lifetime: LifetimeStatus::Active,
                unload_expired,
            }),
            callbacks: Mutex::new(CallbackTable::default()),
        }
    }

    pub fn wrapper_path(&self) -> &Path {
        &self.wrapper_path
    }

    /// Locks the mutable state. Never hold this across a plugin call.
    pub fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.state().descriptor.id
    }

    pub fn title(&self) -> String {
        self.state().descriptor.title.clone()
    }

    pub fn buffer_name(&self) -> String {
        self.state().descriptor.buffer_name.clone()
    }

    pub fn plugin_number(&self) -> i32 {
        self.state().descriptor.plugin_number
    }

    pub fn crypto(&self) -> Option<CryptoParams> {
        self.state().descriptor.crypto
    }

    pub fn lifetime(&self) -> LifetimeStatus {
        self.state().lifetime
    }

    pub fn settings(&self) -> Settings {
        self.state().descriptor.settings.clone()
    }

    pub fn flag(&self, key: &str) -> bool {
        self.state().descriptor.settings.flag(key)
    }

    /// Current proxies, or `None` when the plugin needs (re)loading.
    pub fn plugin(&self) -> Option<PluginHandle> {
        let state = self.state();
        match state.lifetime {
            LifetimeStatus::Active => state.plugin.clone(),
            _ => None,
        }
    }

    pub fn callbacks(&self) -> CallbackTable {
        *self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_callbacks(&self, update: impl FnOnce(&mut CallbackTable)) {
        update(&mut self.callbacks.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// One-line summary used in domain-info answers.
    pub fn describe(&self) -> String {
        let state = self.state();
        let context = state
            .context
            .as_ref()
            .map(ExecutionContext::describe)
            .unwrap_or_else(|| "no context".to_string());
        format!(
            "{} [{}] {:?} plugin #{} ({}): {}",
            state.descriptor.title,
            state.descriptor.kind,
            state.lifetime,
            state.descriptor.plugin_number,
            state.descriptor.type_name,
            context
        )
    }
}
