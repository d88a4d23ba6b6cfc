use std::mem;

/// Receives events raised by a plugin; implemented by the host's relay.
pub trait EventSink: Send + Sync {
    /// Delivers `event` and returns it with the host's answer filled in.
    fn raise(&self, event: PluginEvent) -> anyhow::Result<PluginEvent>;
}

/// Event payload plus the result written back by the host callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEvent {
    pub kind: EventKind,
    pub result: i32,
}

impl PluginEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, result: 0 }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// True when both payloads are the same kind of event.
    pub fn same_kind(&self, other: &PluginEvent) -> bool {
        mem::discriminant(&self.kind) == mem::discriminant(&other.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Progress {
        plugin_number: i32,
        source: String,
        target: String,
        percent: i32,
    },
    Log {
        plugin_number: i32,
        kind: i32,
        text: String,
    },
    Request {
        plugin_number: i32,
        request_type: i32,
        title: String,
        text: String,
        /// Default text on the way in, user input on the way back.
        returned: String,
        max_len: usize,
    },
    /// Password store access; `plugin_number < 0` marks a packer-originated call.
    Crypt {
        plugin_number: i32,
        crypto_number: i32,
        mode: i32,
        store: String,
        password: String,
    },
    /// Content/compare progress notification.
    ContentProgress { next_block: i32 },
    ProcessData { file_name: String, size: i32 },
    ChangeVolume { archive: String, mode: i32 },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Progress { .. } => "progress",
            EventKind::Log { .. } => "log",
            EventKind::Request { .. } => "request",
            EventKind::Crypt { .. } => "crypt",
            EventKind::ContentProgress { .. } => "content_progress",
            EventKind::ProcessData { .. } => "process_data",
            EventKind::ChangeVolume { .. } => "change_volume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogKind {
    Connect = 1,
    Disconnect = 2,
    Details = 3,
    TransferComplete = 4,
    ConnectComplete = 5,
    ImportantError = 6,
    OperationComplete = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RequestType {
    Other = 0,
    UserName = 1,
    Password = 2,
    Account = 3,
    UserNameFirewall = 4,
    PasswordFirewall = 5,
    TargetDir = 6,
    Url = 7,
    MsgOk = 8,
    MsgYesNo = 9,
    MsgOkCancel = 10,
    /// Answered by the host itself with a description of loaded contexts.
    DomainInfo = 100,
}

impl RequestType {
    /// Request kinds below `MsgOk` carry a text answer.
    pub fn expects_text(code: i32) -> bool {
        code < RequestType::MsgOk as i32
    }
}
