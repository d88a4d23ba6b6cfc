//! Fixtures shared by the unit tests: sample plugin types, manifests on disk
//! and native callbacks with predictable answers.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{bail, Result};
use isoplug_plugin_sdk::{
    content::{
        CompareResult, FieldInfo, FieldType, FieldValue, SortOrder, ValueResult, SET_CANCEL,
        SET_SUCCESS,
    },
    fs::{self, CopyFlags, CustomIcon, FileTimes, FindData, FsStatus, RemoteInfo},
    lister::{self, ListerStatus, Margins},
    packer::{self, HeaderData, MemPackChunk, OpenMode, PackerStatus, ProcessOperation},
    CapabilityKind, ContentPlugin, Cursor, FsPlugin, ListerPlugin, PackerPlugin, Plugin, PluginCore,
    QuickSearchPlugin, Settings,
};
use serde_json::json;

use crate::{
    context::{FactoryRegistry, Instantiator},
    lifetime::Notifier,
    loader::LibraryInstantiator,
};

pub const SAMPLE_FS: &str = "Sample.SampleFs";
pub const SAMPLE_CONTENT: &str = "Sample.SampleContent";
pub const SAMPLE_PACKER: &str = "Sample.SamplePacker";
pub const SAMPLE_LISTER: &str = "Sample.SampleLister";
pub const SAMPLE_QS: &str = "Sample.SampleSearch";

pub fn create_sample(settings: Settings) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(SampleFs::new(settings)))
}

pub fn registry() -> Arc<dyn Instantiator> {
    let registry = FactoryRegistry::new();
    registry
        .register(SAMPLE_FS, create_sample)
        .register(SAMPLE_CONTENT, |settings| {
            Ok(Box::new(SampleContent {
                core: PluginCore::new(settings),
            }))
        })
        .register(SAMPLE_PACKER, |settings| {
            Ok(Box::new(SamplePacker {
                core: PluginCore::new(settings),
            }))
        })
        .register(SAMPLE_LISTER, |settings| {
            Ok(Box::new(SampleLister {
                core: PluginCore::new(settings),
            }))
        })
        .register(SAMPLE_QS, |settings| {
            Ok(Box::new(SampleSearch {
                core: PluginCore::new(settings),
            }))
        });
    Arc::new(LibraryInstantiator::new(registry))
}

/// Writes `<name>.plugin.json` into `dir` and returns the library path it
/// describes.
pub fn write_manifest(dir: &Path, name: &str, manifest: serde_json::Value) -> PathBuf {
    let library = dir.join(format!("{name}.dll"));
    let path = isoplug_plugin_sdk::manifest::manifest_path(&library);
    std::fs::write(path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
    library
}

/// Lays out a wrapper of `kind` in `dir` backed by a library declaring every
/// sample type, with `settings` written next to it.
pub fn sample_wrapper(dir: &Path, kind: CapabilityKind, settings: &[(&str, &str)]) -> PathBuf {
    let wrapper = dir.join(format!("sample.{}", kind.extension()));
    let library = settings
        .iter()
        .find(|(key, _)| *key == "plugin_library")
        .map(|(_, value)| value.to_string())
        .unwrap_or_else(|| format!("sample.{}", std::env::consts::DLL_EXTENSION));
    let stem = Path::new(&library)
        .file_stem()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let manifest = json!({
        "name": stem,
        "version": "1.2",
        "types": [
            {"name": "SampleFs", "namespace": "Sample", "implements": ["FsPlugin", "ContentPlugin"],
             "methods": [
                 "find_first",
                 "find_next",
                 "get_file",
                 "delete_file",
                 "get_supported_field",
                 "get_value"
             ]},
            {"name": "SampleContent", "namespace": "Sample", "implements": ["ContentPlugin"]},
            {"name": "SamplePacker", "namespace": "Sample", "implements": ["PackerPlugin"]},
            {"name": "SampleLister", "namespace": "Sample", "implements": ["ListerPlugin"]},
            {"name": "SampleSearch", "namespace": "Sample", "implements": ["QuickSearchPlugin"]}
        ]
    });
    std::fs::write(
        isoplug_plugin_sdk::manifest::manifest_path(&dir.join(&library)),
        serde_json::to_vec_pretty(&manifest).unwrap(),
    )
    .unwrap();

    let mut toml = String::from("[settings]\n");
    for (key, value) in settings {
        toml.push_str(&format!("{key} = \"{value}\"\n"));
    }
    std::fs::write(crate::settings::settings_path(&wrapper), toml).unwrap();
    wrapper
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, String)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn notice_titles(&self) -> Vec<String> {
        self.notices.lock().unwrap().iter().map(|(title, _)| title.clone()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, title: &str, text: &str) {
        self.notices.lock().unwrap().push((title.to_string(), text.to_string()));
    }

    fn error(&self, signature: &str, _err: &anyhow::Error) {
        self.errors.lock().unwrap().push(signature.to_string());
    }
}

struct Listing {
    entries: Vec<FindData>,
    next: usize,
}

/// File system with a fixed root listing that also serves content fields.
pub struct SampleFs {
    core: PluginCore,
    entries: Vec<FindData>,
}

impl SampleFs {
    fn new(settings: Settings) -> Self {
        Self {
            core: PluginCore::new(settings),
            entries: vec![
                FindData::file("readme.txt", 12),
                FindData::directory("docs"),
                FindData::file("data.bin", 4096),
            ],
        }
    }

    fn entry(&self, remote: &str) -> Option<&FindData> {
        let name = remote.trim_start_matches('/');
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn step(listing: &Listing) -> Option<(Cursor, FindData)> {
        let entry = listing.entries.get(listing.next)?.clone();
        let cursor: Cursor = Arc::new(Listing {
            entries: listing.entries.clone(),
            next: listing.next + 1,
        });
        Some((cursor, entry))
    }
}

impl Plugin for SampleFs {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_fs(&mut self) -> Option<&mut dyn FsPlugin> {
        Some(self)
    }

    fn as_content(&mut self) -> Option<&mut dyn ContentPlugin> {
        Some(self)
    }
}

impl FsPlugin for SampleFs {
    fn find_first(&mut self, path: &str) -> Result<Option<(Cursor, FindData)>> {
        if path == "/missing" {
            bail!("no such directory: {path}");
        }
        if path != "/" {
            return Ok(None);
        }
        Ok(Self::step(&Listing {
            entries: self.entries.clone(),
            next: 0,
        }))
    }

    fn find_next(&mut self, cursor: &Cursor) -> Result<Option<(Cursor, FindData)>> {
        match cursor.downcast_ref::<Listing>() {
            Some(listing) => Ok(Self::step(listing)),
            None => bail!("foreign cursor"),
        }
    }

    fn get_file(
        &mut self,
        remote: &str,
        local: &mut String,
        _flags: CopyFlags,
        _info: &RemoteInfo,
    ) -> Result<FsStatus> {
        if self.core.progress(remote, local, 50)? {
            return Ok(FsStatus::UserAbort);
        }
        local.push_str(".part");
        Ok(FsStatus::Ok)
    }

    fn delete_file(&mut self, name: &str) -> Result<bool> {
        if name.ends_with("locked") {
            bail!("{name} is locked");
        }
        Ok(self.entries.iter().any(|entry| name.ends_with(&entry.name)))
    }

    fn root_name(&self) -> Option<String> {
        Some("Sample Root".into())
    }

    fn set_attr(&mut self, remote: &str, _attributes: u32) -> Result<bool> {
        Ok(self.entry(remote).is_some())
    }

    fn set_time(&mut self, remote: &str, times: FileTimes) -> Result<bool> {
        Ok(self.entry(remote).is_some() && times.modified.is_some())
    }

    fn extract_custom_icon(&mut self, remote: &mut String, _flags: i32) -> Result<CustomIcon> {
        match self.entry(remote) {
            Some(entry) if entry.attributes & FindData::ATTR_DIRECTORY != 0 => {
                remote.push_str("/folder.ico");
                Ok(CustomIcon::Extracted(0x10))
            }
            _ => Ok(CustomIcon::UseDefault),
        }
    }

    fn get_local_name(&mut self, remote: &str) -> Result<Option<String>> {
        Ok(self
            .entry(remote)
            .filter(|entry| entry.attributes & FindData::ATTR_DIRECTORY == 0)
            .map(|entry| format!("/srv/sample/{}", entry.name)))
    }

    fn background_flags(&self) -> i32 {
        fs::background::DOWNLOAD | fs::background::UPLOAD
    }
}

impl ContentPlugin for SampleFs {
    fn get_supported_field(&mut self, index: i32) -> Result<Option<FieldInfo>> {
        Ok((index == 0).then(|| FieldInfo {
            name: "name length".into(),
            units: String::new(),
            field_type: FieldType::Numeric32,
        }))
    }

    fn get_value(
        &mut self,
        file: &str,
        field: i32,
        _unit: i32,
        _flags: i32,
    ) -> Result<ValueResult> {
        if field != 0 {
            return Ok(ValueResult::NoSuchField);
        }
        Ok(ValueResult::Value(FieldValue::Int32(file.chars().count() as i32)))
    }
}

pub struct SampleContent {
    core: PluginCore,
}

impl Plugin for SampleContent {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_content(&mut self) -> Option<&mut dyn ContentPlugin> {
        Some(self)
    }
}

impl ContentPlugin for SampleContent {
    fn get_supported_field(&mut self, index: i32) -> Result<Option<FieldInfo>> {
        Ok(match index {
            0 => Some(FieldInfo {
                name: "title".into(),
                units: String::new(),
                field_type: FieldType::WideString,
            }),
            1 => Some(FieldInfo {
                name: "size".into(),
                units: "bytes|kbytes".into(),
                field_type: FieldType::Numeric64,
            }),
            _ => None,
        })
    }

    fn get_value(&mut self, file: &str, field: i32, unit: i32, _flags: i32) -> Result<ValueResult> {
        Ok(match field {
            0 => ValueResult::Value(FieldValue::Text(format!("Title of {file}"))),
            1 if unit == 1 => ValueResult::Value(FieldValue::Int64(2)),
            1 => ValueResult::Value(FieldValue::Int64(2048)),
            _ => ValueResult::NoSuchField,
        })
    }

    fn set_value(
        &mut self,
        _file: &str,
        field: i32,
        _unit: i32,
        value: Option<FieldValue>,
        _flags: i32,
    ) -> Result<bool> {
        Ok(field == 0 && matches!(value, Some(FieldValue::Text(_)) | None))
    }

    fn get_default_sort_order(&mut self, field: i32) -> Result<SortOrder> {
        Ok(if field == 1 {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        })
    }

    fn get_supported_field_flags(&mut self, _field: i32) -> Result<i32> {
        Ok(1)
    }

    /// Upper-cases the title; any other field is cancelled.
    fn edit_value(
        &mut self,
        _window: isize,
        field: i32,
        _unit: i32,
        value: &mut Option<FieldValue>,
        _flags: i32,
        _language: &str,
    ) -> Result<i32> {
        match value {
            Some(FieldValue::Text(text)) if field == 0 => {
                *text = text.to_uppercase();
                Ok(SET_SUCCESS)
            }
            _ => Ok(SET_CANCEL),
        }
    }

    fn send_state_information(&mut self, _state: i32, _path: &str) -> Result<()> {
        Ok(())
    }

    /// Reads two blocks per file; `large` files use blocks big enough for the
    /// test callback to abort.
    fn compare_files(
        &mut self,
        _index: i32,
        _first: &str,
        second: &str,
        _details: &[RemoteInfo; 2],
    ) -> Result<CompareResult> {
        let large = second.contains("large");
        let block = if large { 65_536 } else { 4096 };
        for _ in 0..2 {
            if self.core.content_progress(block)? {
                return Ok(CompareResult::Aborted);
            }
        }
        Ok(if large {
            CompareResult::NotEqual
        } else {
            CompareResult::Equal
        })
    }

    fn detect_string(&self) -> Option<String> {
        Some("EXT=\"SMP\"".into())
    }
}

/// In-memory pack stream; counts the bytes packed so far.
struct MemStream {
    packed: usize,
}

struct ArchiveSession {
    archive: String,
    files: Vec<&'static str>,
    next: usize,
}

pub struct SamplePacker {
    core: PluginCore,
}

impl Plugin for SamplePacker {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_packer(&mut self) -> Option<&mut dyn PackerPlugin> {
        Some(self)
    }
}

impl PackerPlugin for SamplePacker {
    fn open_archive(&mut self, archive: &str, _mode: OpenMode) -> Result<Cursor> {
        if !archive.ends_with(".smp") {
            return Err(PackerStatus::UnknownFormat.into());
        }
        Ok(Arc::new(ArchiveSession {
            archive: archive.to_string(),
            files: vec!["a.txt", "b.txt"],
            next: 0,
        }))
    }

    fn read_header(&mut self, session: &Cursor) -> Result<Option<(Cursor, HeaderData)>> {
        let Some(session) = session.downcast_ref::<ArchiveSession>() else {
            bail!("foreign archive session");
        };
        let Some(name) = session.files.get(session.next) else {
            return Ok(None);
        };
        let header = HeaderData {
            archive: session.archive.clone(),
            file_name: name.to_string(),
            size: 10,
            packed_size: 5,
            ..HeaderData::default()
        };
        let next: Cursor = Arc::new(ArchiveSession {
            archive: session.archive.clone(),
            files: session.files.clone(),
            next: session.next + 1,
        });
        Ok(Some((next, header)))
    }

    fn process_file(
        &mut self,
        _session: &Cursor,
        operation: ProcessOperation,
        dest: Option<&str>,
    ) -> Result<PackerStatus> {
        if operation == ProcessOperation::Extract {
            let event = self.core.raise(isoplug_plugin_sdk::EventKind::ProcessData {
                file_name: dest.unwrap_or_default().to_string(),
                size: 10,
            })?;
            if event.result == 0 {
                return Ok(PackerStatus::Aborted);
            }
        }
        Ok(PackerStatus::Success)
    }

    fn close_archive(&mut self, _session: Cursor) -> Result<PackerStatus> {
        Ok(PackerStatus::Success)
    }

    fn can_you_handle_this_file(&mut self, file: &str) -> Result<bool> {
        Ok(file.ends_with(".smp"))
    }

    fn configure_packer(&mut self, _window: isize) -> Result<()> {
        Ok(())
    }

    fn start_mem_pack(&mut self, options: i32, _file: &str) -> Result<Cursor> {
        if options & packer::mem_pack::WANT_HEADERS != 0 {
            return Err(PackerStatus::NotSupported.into());
        }
        Ok(Arc::new(MemStream { packed: 0 }))
    }

    /// "Packs" by upper-casing; an empty input ends the stream.
    fn pack_to_mem(
        &mut self,
        session: &Cursor,
        input: &[u8],
        output_len: usize,
        _seek_by: i32,
    ) -> Result<(Cursor, MemPackChunk)> {
        let Some(stream) = session.downcast_ref::<MemStream>() else {
            bail!("foreign pack stream");
        };
        let output: Vec<u8> = input.iter().take(output_len).map(u8::to_ascii_uppercase).collect();
        let next: Cursor = Arc::new(MemStream {
            packed: stream.packed + output.len(),
        });
        let chunk = MemPackChunk {
            taken: output.len(),
            done: input.is_empty(),
            output,
        };
        Ok((next, chunk))
    }

    fn done_mem_pack(&mut self, session: Cursor) -> Result<PackerStatus> {
        match session.downcast_ref::<MemStream>() {
            Some(_) => Ok(PackerStatus::Success),
            None => Ok(PackerStatus::BadData),
        }
    }

    fn capabilities(&self) -> i32 {
        4
    }

    fn background_flags(&self) -> i32 {
        packer::background::UNPACK
    }
}

pub struct SampleLister {
    core: PluginCore,
}

impl Plugin for SampleLister {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_lister(&mut self) -> Option<&mut dyn ListerPlugin> {
        Some(self)
    }
}

impl ListerPlugin for SampleLister {
    fn load(&mut self, parent: isize, file: &str, _flags: i32) -> Result<Option<Cursor>> {
        Ok(file.ends_with(".txt").then(|| Arc::new((parent, file.to_string())) as Cursor))
    }

    fn search_text(&mut self, window: &Cursor, text: &str, _params: i32) -> Result<ListerStatus> {
        let found = window
            .downcast_ref::<(isize, String)>()
            .is_some_and(|(_, file)| file.contains(text));
        Ok(if found { ListerStatus::Ok } else { ListerStatus::Error })
    }

    fn send_command(
        &mut self,
        _window: &Cursor,
        command: i32,
        _parameter: i32,
    ) -> Result<ListerStatus> {
        Ok(if command == lister::command::SELECT_ALL {
            ListerStatus::Ok
        } else {
            ListerStatus::Error
        })
    }

    fn print(
        &mut self,
        _window: &Cursor,
        _file: &str,
        printer: &str,
        _flags: i32,
        margins: Margins,
    ) -> Result<ListerStatus> {
        Ok(if printer.is_empty() || margins.left < 0 {
            ListerStatus::Error
        } else {
            ListerStatus::Ok
        })
    }

    fn notification_received(
        &mut self,
        _window: &Cursor,
        message: i32,
        _wparam: isize,
        _lparam: isize,
    ) -> Result<i32> {
        Ok(message + 1)
    }

    /// Bitmap-looking content yields a handle derived from the size.
    fn get_preview_bitmap(
        &mut self,
        _file: &str,
        width: i32,
        height: i32,
        content: &[u8],
    ) -> Result<Option<isize>> {
        Ok(content.starts_with(b"BM").then(|| (width * height) as isize))
    }

    fn search_dialog(&mut self, _window: &Cursor, find_next: bool) -> Result<ListerStatus> {
        Ok(if find_next {
            ListerStatus::Ok
        } else {
            ListerStatus::Error
        })
    }

    fn detect_string(&self) -> Option<String> {
        Some("EXT=\"TXT\"".into())
    }
}

pub struct SampleSearch {
    core: PluginCore,
}

impl Plugin for SampleSearch {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_quick_search(&mut self) -> Option<&mut dyn QuickSearchPlugin> {
        Some(self)
    }
}

impl QuickSearchPlugin for SampleSearch {
    fn match_file(&mut self, filter: &str, file_name: &str) -> Result<bool> {
        Ok(file_name.to_lowercase().contains(&filter.to_lowercase()))
    }

    fn match_get_set_options(&mut self, status: i32) -> Result<i32> {
        Ok(status | 1)
    }
}

/// Native callbacks with deterministic answers.
pub mod callbacks {
    use std::ffi::{c_char, c_int};

    use crate::ffi;

    pub unsafe extern "system" fn progress_a(
        _: c_int,
        _: *const c_char,
        _: *const c_char,
        percent: c_int,
    ) -> c_int {
        percent * 2
    }

    pub unsafe extern "system" fn progress_w(
        _: c_int,
        _: *const u16,
        _: *const u16,
        percent: c_int,
    ) -> c_int {
        percent * 2
    }

    /// Replaces the returned text with `TITLE:current`.
    pub unsafe extern "system" fn request_w(
        _: c_int,
        _: c_int,
        title: *const u16,
        _: *const u16,
        returned: *mut u16,
        max_len: c_int,
    ) -> c_int {
        let title = ffi::read_wide(title).unwrap_or_default().to_uppercase();
        let current = ffi::read_wide(returned).unwrap_or_default();
        ffi::write_wide(returned, max_len as usize, &format!("{title}:{current}"));
        1
    }

    pub unsafe extern "system" fn crypt_a(
        _: c_int,
        _: c_int,
        _: c_int,
        store: *mut c_char,
        password: *mut c_char,
        max_len: c_int,
    ) -> c_int {
        let store = ffi::read_ansi(store).unwrap_or_default();
        ffi::write_ansi(password, max_len as usize, &format!("fs:{store}"));
        0
    }

    pub unsafe extern "system" fn pk_crypt_w(
        _: c_int,
        _: c_int,
        store: *mut u16,
        password: *mut u16,
        max_len: c_int,
    ) -> c_int {
        let store = ffi::read_wide(store).unwrap_or_default();
        ffi::write_wide(password, max_len as usize, &format!("pk:{store}"));
        0
    }

    pub unsafe extern "system" fn change_vol_a(archive: *mut c_char, _: c_int) -> c_int {
        let name = ffi::read_ansi(archive).unwrap_or_default().replace("part1", "part2");
        ffi::write_ansi(archive, ffi::MAX_PATH, &name);
        1
    }

    pub unsafe extern "system" fn process_data_stop(_: *mut c_char, _: c_int) -> c_int {
        0
    }

    /// Aborts once a block larger than 8 KiB is announced.
    pub unsafe extern "system" fn content_progress(next_block: c_int) -> c_int {
        c_int::from(next_block > 8192)
    }
}

/// Runs `f` with a subscriber that collects formatted log lines.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&sink.0.lock().unwrap()).into_owned();
    (result, logs)
}
