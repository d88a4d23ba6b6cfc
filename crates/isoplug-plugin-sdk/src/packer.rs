use std::time::SystemTime;

use crate::{
    error::{mandatory, optional},
    Cursor,
};

/// Archive status codes; also usable as an error to fail `open_archive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(i32)]
pub enum PackerStatus {
    #[error("success")]
    Success = 0,
    #[error("no more files in archive")]
    EndArchive = 10,
    #[error("not enough memory")]
    NoMemory = 11,
    #[error("data is bad")]
    BadData = 12,
    #[error("CRC error in archive data")]
    BadArchive = 13,
    #[error("archive format unknown")]
    UnknownFormat = 14,
    #[error("cannot open existing file")]
    OpenError = 15,
    #[error("cannot create file")]
    CreateError = 16,
    #[error("error closing file")]
    CloseError = 17,
    #[error("error reading from file")]
    ReadError = 18,
    #[error("error writing to file")]
    WriteError = 19,
    #[error("buffer too small")]
    SmallBuffer = 20,
    #[error("function aborted by user")]
    Aborted = 21,
    #[error("no files found")]
    NoFiles = 22,
    #[error("too many files to pack")]
    TooManyFiles = 23,
    #[error("function not supported")]
    NotSupported = 24,
}

impl PackerStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    List,
    Extract,
}

impl OpenMode {
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            OpenMode::Extract
        } else {
            OpenMode::List
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOperation {
    Skip,
    Test,
    Extract,
}

impl ProcessOperation {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ProcessOperation::Test,
            2 => ProcessOperation::Extract,
            _ => ProcessOperation::Skip,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderData {
    pub archive: String,
    pub file_name: String,
    pub size: u64,
    pub packed_size: u64,
    pub attributes: u32,
    pub crc: u32,
    pub modified: Option<SystemTime>,
}

/// Options of `start_mem_pack`.
pub mod mem_pack {
    /// The packed stream must carry file headers.
    pub const WANT_HEADERS: i32 = 1;
}

/// Bits reported through `GetBackgroundFlags`.
pub mod background {
    pub const UNPACK: i32 = 1;
    pub const PACK: i32 = 2;
    pub const MEM_PACK: i32 = 4;
}

/// Result of one `pack_to_mem` step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemPackChunk {
    /// Input bytes consumed.
    pub taken: usize,
    /// Packed bytes produced, at most the output size given.
    pub output: Vec<u8>,
    /// True once the whole stream has been written.
    pub done: bool,
}

impl MemPackChunk {
    pub fn code(&self) -> i32 {
        i32::from(self.done)
    }
}

/// Archive (packer) capability contract.
pub trait PackerPlugin {
    /// Opens an archive session; fail with a [`PackerStatus`] to report why.
    fn open_archive(&mut self, _archive: &str, _mode: OpenMode) -> anyhow::Result<Cursor> {
        mandatory("open_archive")
    }

    /// Reads the next header; `None` means end of archive.
    fn read_header(&mut self, _session: &Cursor) -> anyhow::Result<Option<(Cursor, HeaderData)>> {
        mandatory("read_header")
    }

    fn process_file(
        &mut self,
        _session: &Cursor,
        _operation: ProcessOperation,
        _dest: Option<&str>,
    ) -> anyhow::Result<PackerStatus> {
        mandatory("process_file")
    }

    fn close_archive(&mut self, _session: Cursor) -> anyhow::Result<PackerStatus> {
        mandatory("close_archive")
    }

    fn pack_files(
        &mut self,
        _archive: &str,
        _sub_path: Option<&str>,
        _source_path: &str,
        _files: &[String],
        _flags: i32,
    ) -> anyhow::Result<PackerStatus> {
        optional("pack_files")
    }

    fn delete_files(&mut self, _archive: &str, _files: &[String]) -> anyhow::Result<PackerStatus> {
        optional("delete_files")
    }

    fn can_you_handle_this_file(&mut self, _file: &str) -> anyhow::Result<bool> {
        optional("can_you_handle_this_file")
    }

    /// Shows the plugin's configuration dialog.
    fn configure_packer(&mut self, _window: isize) -> anyhow::Result<()> {
        optional("configure_packer")
    }

    /// Starts packing a single stream in memory; see [`mem_pack`].
    fn start_mem_pack(&mut self, _options: i32, _file: &str) -> anyhow::Result<Cursor> {
        optional("start_mem_pack")
    }

    /// Packs the next part of `input` into at most `output_len` bytes.
    /// Returns the refreshed session with the chunk.
    fn pack_to_mem(
        &mut self,
        _session: &Cursor,
        _input: &[u8],
        _output_len: usize,
        _seek_by: i32,
    ) -> anyhow::Result<(Cursor, MemPackChunk)> {
        optional("pack_to_mem")
    }

    fn done_mem_pack(&mut self, _session: Cursor) -> anyhow::Result<PackerStatus> {
        optional("done_mem_pack")
    }

    /// Capability bits reported through `GetPackerCaps`.
    fn capabilities(&self) -> i32 {
        0
    }

    /// See [`background`].
    fn background_flags(&self) -> i32 {
        0
    }
}
