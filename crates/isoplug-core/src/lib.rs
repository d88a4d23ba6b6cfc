pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod exports;
pub mod ffi;
pub mod handles;
pub mod host;
pub mod lifetime;
pub mod loader;
pub mod record;
pub mod relay;
pub mod resolver;
pub mod settings;
pub mod shims;
pub mod slots;
pub mod synth;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{FactoryRegistry, Instantiator, TypeTarget};
pub use host::{Host, HostBuilder};
pub use lifetime::{FaultClass, Notifier, TracingNotifier};
pub use loader::{LibraryInstantiator, LoaderError};
pub use record::{LifetimeStatus, LoadingRecord};
pub use resolver::Resolver;
pub use wrapper::Wrapper;

/// Returns the crate version baked in at compile time.
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
