use crate::{EventKind, PluginCore};

const MASTER_PASSWORD_SET: i32 = 1;

/// Result of a password store operation as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptResult {
    Ok,
    PasswordNotFound,
    NoMasterPassword,
    Failed,
    WriteError,
}

impl CryptResult {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CryptResult::Ok,
            1 => CryptResult::PasswordNotFound,
            2 => CryptResult::NoMasterPassword,
            3 => CryptResult::WriteError,
            _ => CryptResult::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CryptMode {
    Save = 1,
    Load = 2,
    LoadNoUi = 3,
    Copy = 4,
    Move = 5,
    Delete = 6,
}

impl CryptMode {
    /// Modes that read a password back from the store.
    pub fn loads(mode: i32) -> bool {
        mode == CryptMode::Load as i32 || mode == CryptMode::LoadNoUi as i32
    }
}

/// Access to the host's secure password store through crypt events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginPassword {
    crypto_number: i32,
    flags: i32,
}

impl PluginPassword {
    pub fn new(crypto_number: i32, flags: i32) -> Self {
        Self {
            crypto_number,
            flags,
        }
    }

    pub fn crypto_number(&self) -> i32 {
        self.crypto_number
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    pub fn master_password_set(&self) -> bool {
        self.flags & MASTER_PASSWORD_SET != 0
    }

    pub fn save(
        &self,
        core: &PluginCore,
        store: &str,
        password: &str,
    ) -> anyhow::Result<CryptResult> {
        self.crypt(core, CryptMode::Save, store, password)
            .map(|(result, _)| result)
    }

    pub fn load(&self, core: &PluginCore, store: &str) -> anyhow::Result<(CryptResult, String)> {
        self.crypt(core, CryptMode::Load, store, "")
    }

    /// Loads only if the master password has already been entered.
    pub fn load_no_ui(
        &self,
        core: &PluginCore,
        store: &str,
    ) -> anyhow::Result<(CryptResult, String)> {
        self.crypt(core, CryptMode::LoadNoUi, store, "")
    }

    pub fn copy(
        &self,
        core: &PluginCore,
        source: &str,
        target: &str,
    ) -> anyhow::Result<CryptResult> {
        self.crypt(core, CryptMode::Copy, source, target)
            .map(|(result, _)| result)
    }

    pub fn rename(
        &self,
        core: &PluginCore,
        source: &str,
        target: &str,
    ) -> anyhow::Result<CryptResult> {
        self.crypt(core, CryptMode::Move, source, target)
            .map(|(result, _)| result)
    }

    pub fn delete(&self, core: &PluginCore, store: &str) -> anyhow::Result<CryptResult> {
        self.crypt(core, CryptMode::Delete, store, "")
            .map(|(result, _)| result)
    }

    fn crypt(
        &self,
        core: &PluginCore,
        mode: CryptMode,
        store: &str,
        password: &str,
    ) -> anyhow::Result<(CryptResult, String)> {
        let event = core.raise(EventKind::Crypt {
            plugin_number: core.plugin_number(),
            crypto_number: self.crypto_number,
            mode: mode as i32,
            store: store.to_string(),
            password: password.to_string(),
        })?;
        let result = CryptResult::from_code(event.result);
        let password = match (result, event.kind) {
            (CryptResult::Ok, EventKind::Crypt { password, .. }) => password,
            _ => String::new(),
        };
        Ok((result, password))
    }
}
