use uuid::Uuid;

/// Text every severed-reference error carries.
pub const DISCONNECTED_SIGNATURE: &str = "has been disconnected or does not exist";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("object `{0}` has been disconnected or does not exist")]
    Severed(String),
    #[error("the shared context cannot be unloaded")]
    CannotUnloadShared,
    #[error("re-entrant call into execution context `{0}`")]
    Reentrant(String),
    #[error("no constructor registered for type `{0}`")]
    UnknownType(String),
    #[error("failed to start execution context `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("an event is already in flight for plugin {plugin} on buffer `{buffer}`")]
    EventInFlight { plugin: Uuid, buffer: String },
    #[error("no pending event was posted by the calling thread")]
    NoCaller,
    #[error("no loaded plugin has id {0}")]
    UnknownPlugin(Uuid),
    #[error("correlation slot `{0}` holds no event")]
    SlotEmpty(String),
    #[error("`{sent}` event came back as `{received}`")]
    KindMismatch {
        sent: &'static str,
        received: &'static str,
    },
    #[error("the plugin host has shut down")]
    HostGone,
}

/// Returned to the caller after its plugin was found disconnected; the next
/// call reloads the plugin.
#[derive(Debug, thiserror::Error)]
#[error("operation denied, retry: plugin `{plugin}` was disconnected")]
pub struct AccessDenied {
    pub plugin: String,
}
