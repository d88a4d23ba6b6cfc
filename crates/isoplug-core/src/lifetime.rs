//! Fault classification and the expire/unload half of the plugin lifetime.

use isoplug_plugin_sdk::NotImplemented;

use crate::{
    error::{AccessDenied, ContextError, DISCONNECTED_SIGNATURE},
    host::Host,
    record::{LifetimeStatus, LoadingRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Severed,
    NotImplementedOptional,
    NotImplementedMandatory,
    Ordinary,
}

impl FaultClass {
    pub fn label(self) -> &'static str {
        match self {
            FaultClass::Severed => "severed",
            FaultClass::NotImplementedOptional => "not_implemented",
            FaultClass::NotImplementedMandatory => "not_implemented_mandatory",
            FaultClass::Ordinary => "ordinary",
        }
    }
}

/// Walks the cause chain of `err` to decide how it is handled.
pub fn classify(err: &anyhow::Error) -> FaultClass {
    for cause in err.chain() {
        if let Some(ContextError::Severed(_)) = cause.downcast_ref::<ContextError>() {
            return FaultClass::Severed;
        }
        if let Some(not_implemented) = cause.downcast_ref::<NotImplemented>() {
            return if not_implemented.mandatory {
                FaultClass::NotImplementedMandatory
            } else {
                FaultClass::NotImplementedOptional
            };
        }
    }
    if err
        .chain()
        .any(|cause| cause.to_string().contains(DISCONNECTED_SIGNATURE))
    {
        return FaultClass::Severed;
    }
    FaultClass::Ordinary
}

/// User-visible notices and error dialogs.
pub trait Notifier: Send + Sync {
    fn notice(&self, title: &str, text: &str);
    fn error(&self, signature: &str, err: &anyhow::Error);
}

/// Writes notices to the tracing subscriber instead of showing dialogs.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notice(&self, title: &str, text: &str) {
        tracing::warn!(title, "{text}");
    }

    fn error(&self, signature: &str, err: &anyhow::Error) {
        tracing::error!(call = signature, "{err:#}");
    }
}

impl Host {
    /// Routes a failed plugin call and returns the error the caller sees.
    ///
    /// `context_id` is the context the failed call went to; a severed fault
    /// from a context the record has already replaced changes nothing.
    pub fn on_fault(
        &self,
        record: &LoadingRecord,
        context_id: u64,
        signature: &str,
        err: anyhow::Error,
    ) -> anyhow::Error {
        let class = classify(&err);
        if class != FaultClass::NotImplementedOptional {
            metrics::counter!("isoplug_plugin_faults_total", "kind" => class.label()).increment(1);
        }
        match class {
            FaultClass::Severed => {
                self.expire(record, context_id);
                AccessDenied {
                    plugin: record.title(),
                }
                .into()
            }
            FaultClass::NotImplementedOptional => {
                tracing::trace!(call = signature, "{err}");
                err
            }
            FaultClass::NotImplementedMandatory | FaultClass::Ordinary => {
                self.report(record, signature, &err);
                err
            }
        }
    }

    /// Marks the record expired and, if its policy allows, unloads its
    /// context. Repeated calls are no-ops.
    pub fn expire(&self, record: &LoadingRecord, context_id: u64) -> LifetimeStatus {
        let mut state = record.state();
        let current = state.context.as_ref().map(|c| c.id());
        if current != Some(context_id) || state.lifetime != LifetimeStatus::Active {
            return state.lifetime;
        }
        state.lifetime = LifetimeStatus::Expired;
        let title = state.descriptor.title.clone();
        tracing::warn!(
            plugin = %title,
            wrapper = %record.wrapper_path().display(),
            "plugin reference severed"
        );

        if !state.unload_expired {
            drop(state);
            self.notifier().notice(
                "Plugin expired",
                &format!("{title}: the plugin has expired and will be reloaded on the next call."),
            );
            return LifetimeStatus::Expired;
        }

        let context = state.context.take();
        state.plugin = None;
        state.lifetime = LifetimeStatus::Unloaded;
        drop(state);

        if let Some(context) = context.filter(|c| !c.is_shared()) {
            if let Err(err) = context.unload() {
                tracing::warn!(plugin = %title, error = %err, "failed to unload expired context");
            }
        }
        self.notifier().notice(
            "Plugin disconnected",
            &format!(
                "{title}: the plugin was disconnected and its context unloaded \
                 (main window {:#x}). Retry the operation to reload it.",
                self.main_window()
            ),
        );
        LifetimeStatus::Unloaded
    }

    fn report(&self, record: &LoadingRecord, signature: &str, err: &anyhow::Error) {
        let settings = record.settings();
        tracing::error!(plugin = %record.title(), call = signature, "plugin call failed: {err:#}");
        if !settings.flag("hide_error_dialog") {
            self.notifier().error(signature, err);
        }
    }
}
