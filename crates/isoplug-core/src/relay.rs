use std::sync::Weak;

use isoplug_plugin_sdk::{EventSink, PluginEvent};
use uuid::Uuid;

use crate::{error::RelayError, host::HostState};

/// Event sink attached to every plugin object. Carries events back to the
/// host through the correlation slots and blocks until they are answered.
pub struct Relay {
    host: Weak<HostState>,
    plugin: Uuid,
    buffer: String,
}

impl Relay {
    pub(crate) fn new(host: Weak<HostState>, plugin: Uuid, buffer: impl Into<String>) -> Self {
        Self {
            host,
            plugin,
            buffer: buffer.into(),
        }
    }
}

impl EventSink for Relay {
    fn raise(&self, event: PluginEvent) -> anyhow::Result<PluginEvent> {
        let host = self.host.upgrade().ok_or(RelayError::HostGone)?;
        let sent = event.name();
        host.slots.begin(self.plugin, &self.buffer, event.clone())?;
        let dispatched = host.dispatch_pending();
        let resolved = host.slots.finish(self.plugin, &self.buffer);
        dispatched?;

        let resolved = resolved.ok_or_else(|| RelayError::SlotEmpty(self.buffer.clone()))?;
        if !resolved.same_kind(&event) {
            return Err(RelayError::KindMismatch {
                sent,
                received: resolved.name(),
            }
            .into());
        }
        metrics::counter!("isoplug_relay_events_total", "event" => sent).increment(1);
        tracing::trace!(
            plugin = %self.plugin,
            event = sent,
            result = resolved.result,
            "relayed event"
        );
        Ok(resolved)
    }
}
