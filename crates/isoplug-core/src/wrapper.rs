//! The safe half of a wrapper library: resolves the plugin behind one wrapper
//! file and runs contract calls against it with fault handling.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use isoplug_plugin_sdk::{CapabilityKind, NotImplemented, Plugin};

use crate::{
    context::RemoteRef,
    host::Host,
    record::{LoadingRecord, PluginHandle},
};

/// One wrapper file bound to the host. Entry points of a wrapper library go
/// through exactly one of these.
#[derive(Debug, Clone)]
pub struct Wrapper {
    host: Host,
    path: PathBuf,
    kind: CapabilityKind,
}

impl Wrapper {
    pub fn new(host: Host, path: impl Into<PathBuf>, kind: CapabilityKind) -> Self {
        Self {
            host,
            path: path.into(),
            kind,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Loads or reloads the plugin. Load failures are reported once here.
    pub fn plugin(&self, signature: &str) -> Result<(Arc<LoadingRecord>, PluginHandle)> {
        self.host.get_plugin(&self.path, self.kind).map_err(|err| {
            let err = err.context(format!("failed to load plugin for {}", self.path.display()));
            tracing::error!(wrapper = %self.path.display(), call = signature, "{err:#}");
            self.host.notifier().error(signature, &err);
            err
        })
    }

    /// Runs `f` on the primary plugin object.
    pub fn invoke<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Plugin) -> Result<R> + Send + 'static,
    {
        let (record, plugin) = self.plugin(signature)?;
        self.call_on(&record, &plugin.primary, signature, f)
    }

    /// Runs `f` on the object serving content fields: the embedded content
    /// plugin of a file-system wrapper, otherwise the primary object.
    pub fn invoke_content<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Plugin) -> Result<R> + Send + 'static,
    {
        let (record, plugin) = self.plugin(signature)?;
        if self.kind != CapabilityKind::FileSystem {
            return self.call_on(&record, &plugin.primary, signature, f);
        }
        let Some(content) = plugin.content else {
            tracing::trace!(plugin = %record.title(), call = signature, "no content plugin");
            return Err(NotImplemented::optional("content")).context(signature);
        };
        self.call_on(&record, &content, signature, f)
    }

    /// Runs `f` on every distinct object of the plugin, primary first.
    pub fn invoke_all<F>(&self, signature: &'static str, f: F) -> Result<()>
    where
        F: Fn(&mut dyn Plugin) -> Result<()> + Clone + Send + 'static,
    {
        let (record, plugin) = self.plugin(signature)?;
        self.call_on(&record, &plugin.primary, signature, f.clone())?;
        if let Some(content) = plugin.content.as_ref().filter(|_| !plugin.content_shared) {
            self.call_on(&record, content, signature, f)?;
        }
        self.host.fill_record(&record)
    }

    pub(crate) fn call_on<R, F>(
        &self,
        record: &LoadingRecord,
        remote: &RemoteRef,
        signature: &'static str,
        f: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Plugin) -> Result<R> + Send + 'static,
    {
        if record.flag("write_trace") {
            tracing::debug!(plugin = %record.title(), call = signature, "plugin call");
        } else {
            tracing::trace!(call = signature, "plugin call");
        }
        metrics::counter!("isoplug_plugin_calls_total", "call" => signature).increment(1);
        let context = remote.context().id();
        remote
            .call(f)
            .map_err(|err| self.host.on_fault(record, context, signature, err))
    }
}
