use std::time::SystemTime;

use crate::{
    error::{mandatory, optional},
    Cursor,
};

/// One directory entry produced by an iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindData {
    pub name: String,
    pub attributes: u32,
    pub size: u64,
    pub created: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl FindData {
    pub const ATTR_DIRECTORY: u32 = 0x10;

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Self::ATTR_DIRECTORY,
            ..Self::default()
        }
    }
}

/// Result codes of file transfer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FsStatus {
    Ok = 0,
    Exists = 1,
    NotFound = 2,
    ReadError = 3,
    WriteError = 4,
    UserAbort = 5,
    NotSupported = 6,
    ExistsResumeAllowed = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExecStatus {
    Ok = 0,
    Error = 1,
    Yourself = -1,
    SymLink = -2,
}

/// Bit set passed to get/put operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyFlags(pub u32);

impl CopyFlags {
    pub const OVERWRITE: u32 = 1;
    pub const RESUME: u32 = 2;
    pub const MOVE: u32 = 4;
    pub const EXISTS_SAME_CASE: u32 = 8;
    pub const EXISTS_DIFFERENT_CASE: u32 = 16;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }
}

/// Description of the remote file involved in a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    pub size: u64,
    pub attributes: u32,
    pub modified: Option<SystemTime>,
}

/// Timestamps handed to `set_time`; `None` leaves that time unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub created: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

/// Whether a status notification opens or closes an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPhase {
    Start,
    End,
}

impl StatusPhase {
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            StatusPhase::End
        } else {
            StatusPhase::Start
        }
    }
}

/// Icon handed back by `extract_custom_icon`. Handles are native icon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomIcon {
    UseDefault,
    /// The host keeps the icon and must not destroy it.
    Extracted(isize),
    /// The host destroys the icon after use.
    ExtractedDestroy(isize),
    /// Extraction would be slow; the host retries in the background.
    Delayed,
}

impl CustomIcon {
    /// Requests a small icon instead of a large one.
    pub const FLAG_SMALL: i32 = 1;
    /// Set when the host calls from a background thread.
    pub const FLAG_BACKGROUND: i32 = 2;

    pub fn code(self) -> i32 {
        match self {
            CustomIcon::UseDefault => 0,
            CustomIcon::Extracted(_) => 1,
            CustomIcon::ExtractedDestroy(_) => 2,
            CustomIcon::Delayed => 3,
        }
    }

    pub fn handle(self) -> isize {
        match self {
            CustomIcon::Extracted(icon) | CustomIcon::ExtractedDestroy(icon) => icon,
            CustomIcon::UseDefault | CustomIcon::Delayed => 0,
        }
    }
}

/// Thumbnail produced by `get_preview_bitmap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewBitmap {
    None,
    /// Native bitmap handle, owned by the host afterwards.
    Extracted(isize),
    /// Local file the host should render itself.
    ExtractYourself(String),
    /// Like `ExtractYourself`, the host deletes the file when done.
    ExtractYourselfAndDelete(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub bitmap: PreviewBitmap,
    /// Lets the host cache the thumbnail.
    pub cache: bool,
}

impl Preview {
    const CACHE: i32 = 256;

    pub fn code(&self) -> i32 {
        let code = match self.bitmap {
            PreviewBitmap::None => 0,
            PreviewBitmap::Extracted(_) => 1,
            PreviewBitmap::ExtractYourself(_) => 2,
            PreviewBitmap::ExtractYourselfAndDelete(_) => 3,
        };
        if self.cache && code != 0 {
            code | Self::CACHE
        } else {
            code
        }
    }
}

/// Bits reported through `FsGetBackgroundFlags`.
pub mod background {
    pub const DOWNLOAD: i32 = 1;
    pub const UPLOAD: i32 = 2;
    /// Asks the user before moving a transfer to the background.
    pub const ASK_USER: i32 = 4;
}

/// File-system capability contract.
pub trait FsPlugin {
    /// Starts an iteration; `None` means the directory is empty.
    fn find_first(&mut self, _path: &str) -> anyhow::Result<Option<(Cursor, FindData)>> {
        mandatory("find_first")
    }

    /// Continues an iteration, returning the refreshed cursor state.
    fn find_next(&mut self, _cursor: &Cursor) -> anyhow::Result<Option<(Cursor, FindData)>> {
        mandatory("find_next")
    }

    fn find_close(&mut self, _cursor: Cursor) -> anyhow::Result<()> {
        Ok(())
    }

    fn get_file(
        &mut self,
        _remote: &str,
        _local: &mut String,
        _flags: CopyFlags,
        _info: &RemoteInfo,
    ) -> anyhow::Result<FsStatus> {
        optional("get_file")
    }

    fn put_file(
        &mut self,
        _local: &str,
        _remote: &mut String,
        _flags: CopyFlags,
    ) -> anyhow::Result<FsStatus> {
        optional("put_file")
    }

    fn ren_mov_file(
        &mut self,
        _old: &str,
        _new: &str,
        _move_file: bool,
        _overwrite: bool,
        _info: &RemoteInfo,
    ) -> anyhow::Result<FsStatus> {
        optional("ren_mov_file")
    }

    fn delete_file(&mut self, _name: &str) -> anyhow::Result<bool> {
        optional("delete_file")
    }

    fn remove_dir(&mut self, _name: &str) -> anyhow::Result<bool> {
        optional("remove_dir")
    }

    fn mk_dir(&mut self, _name: &str) -> anyhow::Result<bool> {
        optional("mk_dir")
    }

    fn execute_open(&mut self, _window: isize, _remote: &mut String) -> anyhow::Result<ExecStatus> {
        optional("execute_open")
    }

    fn execute_properties(&mut self, _window: isize, _remote: &str) -> anyhow::Result<ExecStatus> {
        optional("execute_properties")
    }

    fn execute_command(
        &mut self,
        _window: isize,
        _remote: &mut String,
        _command: &str,
    ) -> anyhow::Result<ExecStatus> {
        optional("execute_command")
    }

    fn disconnect(&mut self, _root: &str) -> anyhow::Result<bool> {
        optional("disconnect")
    }

    fn set_attr(&mut self, _remote: &str, _attributes: u32) -> anyhow::Result<bool> {
        optional("set_attr")
    }

    fn set_time(&mut self, _remote: &str, _times: FileTimes) -> anyhow::Result<bool> {
        optional("set_time")
    }

    /// Notified around multi-file operations; most plugins ignore it.
    fn status_info(
        &mut self,
        _remote_dir: &str,
        _phase: StatusPhase,
        _operation: i32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// `remote` may be rewritten to name the file the icon was taken from.
    fn extract_custom_icon(
        &mut self,
        _remote: &mut String,
        _flags: i32,
    ) -> anyhow::Result<CustomIcon> {
        optional("extract_custom_icon")
    }

    fn get_preview_bitmap(
        &mut self,
        _remote: &mut String,
        _width: i32,
        _height: i32,
    ) -> anyhow::Result<Preview> {
        optional("get_preview_bitmap")
    }

    /// Local path of `remote` when the file lives on a local disk.
    fn get_local_name(&mut self, _remote: &str) -> anyhow::Result<Option<String>> {
        optional("get_local_name")
    }

    /// See [`background`].
    fn background_flags(&self) -> i32 {
        0
    }

    /// True for plugins whose entries all point at local files.
    fn links_to_local_files(&self) -> bool {
        false
    }

    /// Root name shown by the host; defaults to the plugin title.
    fn root_name(&self) -> Option<String> {
        None
    }
}
