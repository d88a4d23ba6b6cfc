//! The plugin host: loading records, plugin (re)loading and event dispatch.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicIsize, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use anyhow::{anyhow, Context, Result};
use isoplug_plugin_sdk::{
    event::{EventKind, RequestType},
    CapabilityKind, EventSink, Plugin, PluginEvent, Settings,
};
use uuid::Uuid;

use crate::{
    context::{ExecutionContext, Instantiator, LeasePolicy, RemoteRef, TypeTarget},
    error::RelayError,
    handles::HandleTable,
    lifetime::{Notifier, TracingNotifier},
    record::{CryptoParams, LifetimeStatus, LoadingRecord, PluginDescriptor, PluginHandle},
    relay::Relay,
    resolver::{ResolveError, ResolvedType, Resolver},
    settings,
    slots::SlotStore,
};

/// Process-wide host state shared by every wrapper entry point.
pub struct HostState {
    records: RwLock<Vec<Arc<LoadingRecord>>>,
    pub(crate) slots: SlotStore<PluginEvent>,
    handles: HandleTable,
    resolver: Resolver,
    instantiator: Arc<dyn Instantiator>,
    shared: ExecutionContext,
    notifier: Arc<dyn Notifier>,
    main_window: AtomicIsize,
    load_lock: Mutex<()>,
}

/// Cheaply cloneable handle to the host.
#[derive(Clone)]
pub struct Host {
    state: Arc<HostState>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("records", &self.state.records().len())
            .field("handles", &self.state.handles.len())
            .finish()
    }
}

pub struct HostBuilder {
    instantiator: Arc<dyn Instantiator>,
    resolver: Resolver,
    notifier: Arc<dyn Notifier>,
}

impl HostBuilder {
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> Host {
        Host {
            state: Arc::new(HostState {
                records: RwLock::default(),
                slots: SlotStore::new(),
                handles: HandleTable::new(),
                resolver: self.resolver,
                instantiator: self.instantiator,
                shared: ExecutionContext::shared("host"),
                notifier: self.notifier,
                main_window: AtomicIsize::new(0),
                load_lock: Mutex::new(()),
            }),
        }
    }
}

struct Loaded {
    descriptor: PluginDescriptor,
    handle: PluginHandle,
    context: ExecutionContext,
}

impl Host {
    pub fn new(instantiator: Arc<dyn Instantiator>) -> Self {
        Self::builder(instantiator).build()
    }

    pub fn builder(instantiator: Arc<dyn Instantiator>) -> HostBuilder {
        HostBuilder {
            instantiator,
            resolver: Resolver::new(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn handles(&self) -> &HandleTable {
        &self.state.handles
    }

    pub fn resolver(&self) -> &Resolver {
        &self.state.resolver
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.state.notifier.as_ref()
    }

    pub fn shared_context(&self) -> &ExecutionContext {
        &self.state.shared
    }

    pub fn records(&self) -> Vec<Arc<LoadingRecord>> {
        self.state.records()
    }

    pub fn find_by_wrapper(&self, wrapper: &Path) -> Option<Arc<LoadingRecord>> {
        self.state
            .records()
            .into_iter()
            .find(|record| record.wrapper_path() == wrapper)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<Arc<LoadingRecord>> {
        self.state.find_by_id(id)
    }

    pub fn find_by_number(&self, number: i32) -> Option<Arc<LoadingRecord>> {
        self.state
            .records()
            .into_iter()
            .find(|record| record.plugin_number() == number)
    }

    /// Remembers the host's main window; only the first non-zero value sticks.
    pub fn set_main_window(&self, window: isize) {
        if window != 0 {
            let _ = self.state.main_window.compare_exchange(
                0,
                window,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    pub fn main_window(&self) -> isize {
        self.state.main_window.load(Ordering::Acquire)
    }

    pub fn domain_info(&self) -> String {
        self.state.domain_info()
    }

    /// Returns the live plugin for `wrapper`, loading it on first use and
    /// reloading it after it expired.
    pub fn get_plugin(
        &self,
        wrapper: &Path,
        kind: CapabilityKind,
    ) -> Result<(Arc<LoadingRecord>, PluginHandle)> {
        if let Some(record) = self.find_by_wrapper(wrapper) {
            if let Some(plugin) = record.plugin() {
                return Ok((record, plugin));
            }
        }

        let _guard = self
            .state
            .load_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = self.find_by_wrapper(wrapper) {
            if let Some(plugin) = record.plugin() {
                return Ok((record, plugin));
            }
            self.reload(&record)?;
            let plugin = record
                .plugin()
                .ok_or_else(|| anyhow!("plugin for {} did not become active", wrapper.display()))?;
            return Ok((record, plugin));
        }

        let loaded = self.load(wrapper, kind, -1, None)?;
        let handle = loaded.handle.clone();
        let record = Arc::new(LoadingRecord::new(
            loaded.descriptor,
            loaded.handle,
            loaded.context,
        ));
        self.state
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&record));
        Ok((record, handle))
    }

    fn reload(&self, record: &LoadingRecord) -> Result<()> {
        let (kind, number, crypto, previous) = {
            let state = record.state();
            (
                state.descriptor.kind,
                state.descriptor.plugin_number,
                state.descriptor.crypto,
                state.lifetime,
            )
        };
        let loaded = self.load(record.wrapper_path(), kind, number, crypto)?;
        let mut state = record.state();
        state.unload_expired = loaded.descriptor.settings.flag_or("unload_expired", true);
        state.descriptor = loaded.descriptor;
        state.plugin = Some(loaded.handle);
        state.context = Some(loaded.context);
        state.lifetime = LifetimeStatus::Active;
        metrics::counter!("isoplug_plugin_reloads_total").increment(1);
        tracing::info!(
            plugin = %state.descriptor.title,
            wrapper = %record.wrapper_path().display(),
            previous = ?previous,
            plugin_number = number,
            "plugin reloaded"
        );
        Ok(())
    }

    fn load(
        &self,
        wrapper: &Path,
        kind: CapabilityKind,
        plugin_number: i32,
        crypto: Option<CryptoParams>,
    ) -> Result<Loaded> {
        let mut settings = settings::load_wrapper_settings(wrapper)?;
        let library = settings::library_path(wrapper, &settings);
        let folder = library.parent().map(Path::to_path_buf).unwrap_or_default();
        settings.insert("plugin_folder", folder.to_string_lossy());
        let title = settings
            .get("plugin_title")
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                library
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
        settings.insert("plugin_title", title.clone());

        let ty = self.resolve(&library, kind, settings.get("plugin_class"))?;
        let context = if settings.flag("start_in_shared_context") {
            self.state.shared.clone()
        } else {
            ExecutionContext::isolated(title.clone(), &folder)?
        };

        let id = Uuid::new_v4();
        let buffer_name = format!("isoplug:{}:{}", kind.short_name(), title);
        let sink: Arc<dyn EventSink> = Arc::new(Relay::new(
            Arc::downgrade(&self.state),
            id,
            buffer_name.clone(),
        ));
        let lease = LeasePolicy::from_settings(&settings);
        let created = self.instantiate(
            &context, wrapper, &library, &ty, kind, &settings, lease, &sink, plugin_number, crypto,
        );
        let handle = match created {
            Ok(handle) => handle,
            Err(err) => {
                if !context.is_shared() {
                    let _ = context.unload();
                }
                return Err(err);
            }
        };

        if settings.flag("write_trace") {
            tracing::info!(
                plugin = %title,
                wrapper = %wrapper.display(),
                ty = %ty.full_name,
                context = context.id(),
                lease = ?lease,
                "plugin loaded"
            );
        } else {
            tracing::debug!(plugin = %title, ty = %ty.full_name, "plugin loaded");
        }

        Ok(Loaded {
            descriptor: PluginDescriptor {
                id,
                buffer_name,
                wrapper_path: wrapper.to_path_buf(),
                library_path: library,
                kind,
                type_name: ty.full_name,
                title,
                settings,
                plugin_number,
                crypto,
            },
            handle,
            context,
        })
    }

    fn resolve(
        &self,
        library: &Path,
        kind: CapabilityKind,
        hint: Option<&str>,
    ) -> Result<ResolvedType> {
        let contract = kind.contract();
        let found = self
            .state
            .resolver
            .find_type(library, contract, hint)
            .with_context(|| format!("failed to inspect plugin library {}", library.display()))?;
        found.ok_or_else(|| {
            let err = match hint {
                Some(class) => ResolveError::ClassNotFound {
                    class: class.to_string(),
                    contract: contract.to_string(),
                    library: library.to_path_buf(),
                },
                None => ResolveError::NoContract {
                    contract: contract.to_string(),
                    library: library.to_path_buf(),
                },
            };
            err.into()
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &self,
        context: &ExecutionContext,
        wrapper: &Path,
        library: &Path,
        ty: &ResolvedType,
        kind: CapabilityKind,
        settings: &Settings,
        lease: LeasePolicy,
        sink: &Arc<dyn EventSink>,
        plugin_number: i32,
        crypto: Option<CryptoParams>,
    ) -> Result<PluginHandle> {
        let primary = context
            .create_instance(
                Arc::clone(&self.state.instantiator),
                TypeTarget::from(ty),
                settings.clone(),
                lease,
                plugin_init(Arc::clone(sink), plugin_number, crypto),
            )
            .with_context(|| format!("failed to create `{}`", ty.full_name))?;

        if kind != CapabilityKind::FileSystem {
            return Ok(PluginHandle {
                primary,
                content: None,
                content_shared: false,
            });
        }

        let content_library = settings::content_library_path(wrapper, settings, library);
        let hint = settings.get("content_class");
        let contract = CapabilityKind::Content.contract();
        let (content, content_shared) =
            match self.state.resolver.find_type(&content_library, contract, hint) {
                Ok(Some(ct)) if ct.full_name == ty.full_name && ct.library == ty.library => {
                    (Some(primary.clone()), true)
                }
                Ok(Some(ct)) => match context.create_instance(
                    Arc::clone(&self.state.instantiator),
                    TypeTarget::from(&ct),
                    settings.clone(),
                    lease,
                    plugin_init(Arc::clone(sink), plugin_number, crypto),
                ) {
                    Ok(remote) => (Some(remote), false),
                    Err(err) => {
                        tracing::warn!(ty = %ct.full_name, "content plugin not created: {err:#}");
                        (None, false)
                    }
                },
                Ok(None) => {
                    tracing::debug!(library = %content_library.display(), "no content plugin");
                    (None, false)
                }
                Err(err) => {
                    tracing::warn!(
                        library = %content_library.display(),
                        "content plugin lookup failed: {err:#}"
                    );
                    (None, false)
                }
            };
        Ok(PluginHandle {
            primary,
            content,
            content_shared,
        })
    }

    /// Copies the plugin's current number and crypto parameters into its
    /// record so they survive a reload.
    pub fn fill_record(&self, record: &LoadingRecord) -> Result<()> {
        let Some(plugin) = record.plugin() else {
            return Ok(());
        };
        let (number, crypto) = plugin.primary.call(|plugin| {
            let core = plugin.core();
            let crypto = core.password().map(|password| CryptoParams {
                number: password.crypto_number(),
                flags: password.flags(),
            });
            Ok((core.plugin_number(), crypto))
        })?;
        let mut state = record.state();
        state.descriptor.plugin_number = number;
        if crypto.is_some() {
            state.descriptor.crypto = crypto;
        }
        Ok(())
    }
}

fn plugin_init(
    sink: Arc<dyn EventSink>,
    plugin_number: i32,
    crypto: Option<CryptoParams>,
) -> impl FnOnce(&mut dyn Plugin) + Send + 'static {
    move |plugin: &mut dyn Plugin| {
        plugin.core_mut().attach(sink);
        plugin.core_mut().set_plugin_number(plugin_number);
        if let Some(crypto) = crypto {
            plugin.create_password(crypto.number, crypto.flags);
        }
    }
}

impl HostState {
    fn records(&self) -> Vec<Arc<LoadingRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find_by_id(&self, id: Uuid) -> Option<Arc<LoadingRecord>> {
        self.records().into_iter().find(|record| record.id() == id)
    }

    fn domain_info(&self) -> String {
        let mut lines = vec![format!("host: {}", self.shared.describe())];
        lines.extend(self.records().iter().map(|record| record.describe()));
        lines.join("\n")
    }

    /// Answers the event the calling thread just posted: looks up the
    /// posting plugin, dispatches to its native callback and writes the
    /// answer back into the slot.
    pub(crate) fn dispatch_pending(&self) -> Result<()> {
        let id = self.slots.take_caller().ok_or(RelayError::NoCaller)?;
        let record = self.find_by_id(id).ok_or(RelayError::UnknownPlugin(id))?;
        let buffer = record.buffer_name();
        let mut event = self
            .slots
            .read(id, &buffer)
            .ok_or_else(|| RelayError::SlotEmpty(buffer.clone()))?;
        match &mut event.kind {
            EventKind::Request {
                request_type,
                returned,
                max_len,
                ..
            } if *request_type == RequestType::DomainInfo as i32 => {
                *returned = self
                    .domain_info()
                    .chars()
                    .take(max_len.saturating_sub(1))
                    .collect();
                event.result = 1;
            }
            _ => record.callbacks().dispatch(&mut event)?,
        }
        self.slots.write_back(id, &buffer, event);
        Ok(())
    }
}

/// Wrapper path for a library in `dir`; used by tools that lay out plugins.
pub fn wrapper_path(dir: &Path, name: &str, kind: CapabilityKind) -> PathBuf {
    dir.join(format!("{name}.{}", kind.extension()))
}
