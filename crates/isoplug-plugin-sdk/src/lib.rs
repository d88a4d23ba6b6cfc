pub mod content;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod fs;
pub mod lister;
pub mod manifest;
pub mod packer;
pub mod password;
pub mod quick_search;
pub mod settings;

use std::{fmt, str::FromStr, sync::Arc};

pub use content::ContentPlugin;
pub use descriptor::{Constructor, PluginDescriptor};
pub use error::NotImplemented;
pub use event::{EventKind, EventSink, PluginEvent};
pub use fs::FsPlugin;
pub use lister::ListerPlugin;
pub use manifest::{LibraryManifest, TypeManifest};
pub use packer::PackerPlugin;
pub use password::{CryptResult, PluginPassword};
pub use quick_search::QuickSearchPlugin;
pub use settings::Settings;

use anyhow::bail;

/// Opaque per-session state handed across the native boundary as a handle.
pub type Cursor = Arc<dyn std::any::Any + Send + Sync>;

/// The five capability contracts a plugin type may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    Content,
    FileSystem,
    Lister,
    Packer,
    QuickSearch,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 5] = [
        CapabilityKind::Content,
        CapabilityKind::FileSystem,
        CapabilityKind::Lister,
        CapabilityKind::Packer,
        CapabilityKind::QuickSearch,
    ];

    /// Contract identifier used in library manifests.
    pub const fn contract(self) -> &'static str {
        match self {
            CapabilityKind::Content => "ContentPlugin",
            CapabilityKind::FileSystem => "FsPlugin",
            CapabilityKind::Lister => "ListerPlugin",
            CapabilityKind::Packer => "PackerPlugin",
            CapabilityKind::QuickSearch => "QuickSearchPlugin",
        }
    }

    /// Short name accepted on the command line and in `.capability` directives.
    pub const fn short_name(self) -> &'static str {
        match self {
            CapabilityKind::Content => "content",
            CapabilityKind::FileSystem => "fs",
            CapabilityKind::Lister => "lister",
            CapabilityKind::Packer => "packer",
            CapabilityKind::QuickSearch => "qs",
        }
    }

    /// File extension the host expects for a wrapper of this kind.
    pub const fn extension(self) -> &'static str {
        match self {
            CapabilityKind::Content => "wdx",
            CapabilityKind::FileSystem => "wfx",
            CapabilityKind::Lister => "wlx",
            CapabilityKind::Packer => "wcx",
            CapabilityKind::QuickSearch => "dll",
        }
    }

    /// Prefix prepended to operation names to form native export names.
    pub const fn export_prefix(self) -> &'static str {
        match self {
            CapabilityKind::Content => "Content",
            CapabilityKind::FileSystem => "Fs",
            CapabilityKind::Lister => "List",
            CapabilityKind::Packer | CapabilityKind::QuickSearch => "",
        }
    }

    pub fn from_contract(contract: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.contract() == contract)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Content => "Content",
            CapabilityKind::FileSystem => "File System",
            CapabilityKind::Lister => "Lister",
            CapabilityKind::Packer => "Packer",
            CapabilityKind::QuickSearch => "QuickSearch",
        };
        f.write_str(name)
    }
}

impl FromStr for CapabilityKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        let kind = match value.trim().to_ascii_lowercase().as_str() {
            "content" | "wdx" => CapabilityKind::Content,
            "fs" | "filesystem" | "wfx" => CapabilityKind::FileSystem,
            "lister" | "viewer" | "wlx" => CapabilityKind::Lister,
            "packer" | "archive" | "wcx" => CapabilityKind::Packer,
            "qs" | "quicksearch" => CapabilityKind::QuickSearch,
            other => bail!("unknown capability kind `{other}`"),
        };
        Ok(kind)
    }
}

/// Base trait every instantiable plugin type implements.
///
/// A concrete type exposes the capability contracts it supports through the
/// `as_*` accessors; one object may serve several contracts (a file-system
/// plugin that also provides content fields is the common case).
pub trait Plugin: Send + 'static {
    fn core(&self) -> &PluginCore;
    fn core_mut(&mut self) -> &mut PluginCore;

    fn as_fs(&mut self) -> Option<&mut dyn FsPlugin> {
        None
    }

    fn as_content(&mut self) -> Option<&mut dyn ContentPlugin> {
        None
    }

    fn as_packer(&mut self) -> Option<&mut dyn PackerPlugin> {
        None
    }

    fn as_lister(&mut self) -> Option<&mut dyn ListerPlugin> {
        None
    }

    fn as_quick_search(&mut self) -> Option<&mut dyn QuickSearchPlugin> {
        None
    }

    /// Called by the host whenever it assigns crypto parameters.
    fn create_password(&mut self, crypto_number: i32, flags: i32) {
        self.core_mut()
            .set_password(Some(PluginPassword::new(crypto_number, flags)));
    }
}

/// Host parameters passed once after loading through `*SetDefaultParams`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultParams {
    /// Plugin interface version the host implements, as `(high, low)`.
    pub interface_version: (u32, u32),
    /// Settings file the host suggests for plugin configuration.
    pub ini_name: String,
}

/// State shared by every plugin object, embedded by concrete plugin types.
pub struct PluginCore {
    settings: Settings,
    title: String,
    plugin_number: i32,
    password: Option<PluginPassword>,
    default_params: Option<DefaultParams>,
    sink: Option<Arc<dyn EventSink>>,
}

impl PluginCore {
    pub fn new(settings: Settings) -> Self {
        let title = settings.get("plugin_title").unwrap_or_default().to_string();
        Self {
            settings,
            title,
            plugin_number: -1,
            password: None,
            default_params: None,
            sink: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn plugin_number(&self) -> i32 {
        self.plugin_number
    }

    pub fn set_plugin_number(&mut self, number: i32) {
        self.plugin_number = number;
    }

    pub fn password(&self) -> Option<&PluginPassword> {
        self.password.as_ref()
    }

    pub fn set_password(&mut self, password: Option<PluginPassword>) {
        self.password = password;
    }

    pub fn default_params(&self) -> Option<&DefaultParams> {
        self.default_params.as_ref()
    }

    pub fn set_default_params(&mut self, params: DefaultParams) {
        self.default_params = Some(params);
    }

    pub fn show_error_dialog(&self) -> bool {
        !self.settings.flag("hide_error_dialog")
    }

    pub fn write_trace(&self) -> bool {
        self.settings.flag("write_trace")
    }

    /// Installs the back-reference used to raise events to the host.
    pub fn attach(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Raises an event and blocks until the host has answered it.
    ///
    /// Without an attached host the event comes back unchanged with result 0.
    pub fn raise(&self, kind: EventKind) -> anyhow::Result<PluginEvent> {
        let event = PluginEvent::new(kind);
        match &self.sink {
            Some(sink) => sink.raise(event),
            None => Ok(event),
        }
    }

    /// Reports copy progress; a non-zero result means the user aborted.
    pub fn progress(&self, source: &str, target: &str, percent: i32) -> anyhow::Result<bool> {
        let event = self.raise(EventKind::Progress {
            plugin_number: self.plugin_number,
            source: source.to_string(),
            target: target.to_string(),
            percent,
        })?;
        Ok(event.result != 0)
    }

    /// Reports compare progress; `next_block` is the byte count about to be
    /// read. A non-zero result means the user aborted.
    pub fn content_progress(&self, next_block: i32) -> anyhow::Result<bool> {
        let event = self.raise(EventKind::ContentProgress { next_block })?;
        Ok(event.result != 0)
    }

    pub fn log(&self, kind: event::LogKind, text: &str) -> anyhow::Result<()> {
        self.raise(EventKind::Log {
            plugin_number: self.plugin_number,
            kind: kind as i32,
            text: text.to_string(),
        })?;
        Ok(())
    }

    /// Asks the user for input; returns the entered text when confirmed.
    pub fn request(
        &self,
        request: event::RequestType,
        title: &str,
        text: &str,
        default: &str,
        max_len: usize,
    ) -> anyhow::Result<Option<String>> {
        let event = self.raise(EventKind::Request {
            plugin_number: self.plugin_number,
            request_type: request as i32,
            title: title.to_string(),
            text: text.to_string(),
            returned: default.to_string(),
            max_len,
        })?;
        if event.result == 0 {
            return Ok(None);
        }
        match event.kind {
            EventKind::Request { returned, .. } => Ok(Some(returned)),
            _ => Ok(None),
        }
    }
}
