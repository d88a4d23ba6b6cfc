//! Native data layouts and string marshalling shared by the export shims.

use std::{
    ffi::{c_char, c_int, CStr},
    ptr, slice,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use isoplug_plugin_sdk::{
    fs::{FileTimes, FindData, RemoteInfo},
    lister::Margins,
    packer::HeaderData as PluginHeader,
    DefaultParams,
};

pub type Bool = c_int;
pub const TRUE: Bool = 1;
pub const FALSE: Bool = 0;

pub const MAX_PATH: usize = 260;
/// Buffer size used for wide paths in the extended header layout.
pub const WIDE_PATH: usize = 1024;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTime {
    pub low: u32,
    pub high: u32,
}

impl FileTime {
    /// Marker the host reads as "time unknown".
    pub const UNKNOWN: FileTime = FileTime {
        low: 0xFFFF_FFFE,
        high: 0xFFFF_FFFF,
    };

    pub fn from_system_time(time: Option<SystemTime>) -> Self {
        let Some(since_unix) = time.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) else {
            return Self::UNKNOWN;
        };
        let ticks = (since_unix.as_secs() + FILETIME_EPOCH_OFFSET) * 10_000_000
            + u64::from(since_unix.subsec_nanos() / 100);
        Self {
            low: ticks as u32,
            high: (ticks >> 32) as u32,
        }
    }

    /// # Safety
    /// `ptr` must be null or point at a valid `FileTime`.
    pub unsafe fn read(ptr: *const FileTime) -> Option<SystemTime> {
        ptr.as_ref().and_then(|time| time.to_system_time())
    }

    /// Reads the three optional timestamps of a set-time request.
    ///
    /// # Safety
    /// Each pointer must be null or point at a valid `FileTime`.
    pub unsafe fn read_times(
        created: *const Self,
        accessed: *const Self,
        modified: *const Self,
    ) -> FileTimes {
        FileTimes {
            created: Self::read(created),
            accessed: Self::read(accessed),
            modified: Self::read(modified),
        }
    }

    pub fn to_system_time(self) -> Option<SystemTime> {
        if self == Self::UNKNOWN || (self.low == 0 && self.high == 0) {
            return None;
        }
        let ticks = (u64::from(self.high) << 32) | u64::from(self.low);
        let secs = (ticks / 10_000_000).checked_sub(FILETIME_EPOCH_OFFSET)?;
        let nanos = (ticks % 10_000_000) * 100;
        Some(UNIX_EPOCH + Duration::new(secs, nanos as u32))
    }
}

/// Packed DOS date/time (`yyyyyyymmmmddddd hhhhhmmmmmmsssss`), UTC.
pub fn dos_date_time(time: Option<SystemTime>) -> c_int {
    let Some(secs) = time
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
    else {
        return 0;
    };
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    if year < 1980 {
        return 0;
    }
    let date = ((year - 1980) as u32) << 9 | month << 5 | day;
    let time =
        ((rem / 3600) as u32) << 11 | (((rem % 3600) / 60) as u32) << 5 | ((rem % 60) / 2) as u32;
    (date << 16 | time) as c_int
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[repr(C)]
pub struct FindDataA {
    pub attributes: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub size_high: u32,
    pub size_low: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub file_name: [c_char; MAX_PATH],
    pub alternate_name: [c_char; 14],
}

#[repr(C)]
pub struct FindDataW {
    pub attributes: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub size_high: u32,
    pub size_low: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub file_name: [u16; MAX_PATH],
    pub alternate_name: [u16; 14],
}

/// Native record that can be populated from a plugin-side value.
pub trait Fill<T> {
    fn fill(&mut self, value: &T);
}

macro_rules! fill_find_data {
    ($ty:ty, $copy:ident) => {
        impl Fill<FindData> for $ty {
            fn fill(&mut self, data: &FindData) {
                self.attributes = data.attributes;
                self.creation_time = FileTime::from_system_time(data.created);
                self.last_access_time = FileTime::from_system_time(data.accessed);
                self.last_write_time = FileTime::from_system_time(data.modified);
                self.size_high = (data.size >> 32) as u32;
                self.size_low = data.size as u32;
                self.reserved0 = 0;
                self.reserved1 = 0;
                $copy(&mut self.file_name, &data.name);
                $copy(&mut self.alternate_name, "");
            }
        }
    };
}

fill_find_data!(FindDataA, copy_ansi);
fill_find_data!(FindDataW, copy_wide);

#[repr(C)]
pub struct RawRemoteInfo {
    pub size_low: u32,
    pub size_high: u32,
    pub last_write_time: FileTime,
    pub attributes: c_int,
}

impl RawRemoteInfo {
    /// # Safety
    /// `ptr` must be null or point at a valid `RawRemoteInfo`.
    pub unsafe fn read(ptr: *const RawRemoteInfo) -> RemoteInfo {
        let Some(raw) = ptr.as_ref() else {
            return RemoteInfo::default();
        };
        RemoteInfo {
            size: (u64::from(raw.size_high) << 32) | u64::from(raw.size_low),
            attributes: raw.attributes as u32,
            modified: raw.last_write_time.to_system_time(),
        }
    }
}

/// File pair described to `ContentCompareFiles`.
#[repr(C)]
pub struct RawFileDetails {
    pub size1: i64,
    pub size2: i64,
    pub time1: FileTime,
    pub time2: FileTime,
    pub attributes1: u32,
    pub attributes2: u32,
}

impl RawFileDetails {
    /// # Safety
    /// `ptr` must be null or point at a valid `RawFileDetails`.
    pub unsafe fn read(ptr: *const RawFileDetails) -> [RemoteInfo; 2] {
        let Some(raw) = ptr.as_ref() else {
            return [RemoteInfo::default(), RemoteInfo::default()];
        };
        [
            RemoteInfo {
                size: raw.size1.max(0) as u64,
                attributes: raw.attributes1,
                modified: raw.time1.to_system_time(),
            },
            RemoteInfo {
                size: raw.size2.max(0) as u64,
                attributes: raw.attributes2,
                modified: raw.time2.to_system_time(),
            },
        ]
    }
}

/// Parameter block of the `*SetDefaultParams` entry points. Every kind
/// uses the same layout.
#[repr(C)]
pub struct RawDefaultParams {
    pub size: c_int,
    pub version_low: u32,
    pub version_high: u32,
    pub ini_name: [c_char; MAX_PATH],
}

impl RawDefaultParams {
    /// # Safety
    /// `ptr` must be null or point at a valid `RawDefaultParams`.
    pub unsafe fn read(ptr: *const RawDefaultParams) -> Option<DefaultParams> {
        let raw = ptr.as_ref()?;
        Some(DefaultParams {
            interface_version: (raw.version_high, raw.version_low),
            ini_name: from_ansi_buffer(&raw.ini_name),
        })
    }
}

#[repr(C)]
pub struct Rect {
    pub left: c_int,
    pub top: c_int,
    pub right: c_int,
    pub bottom: c_int,
}

impl Rect {
    /// # Safety
    /// `ptr` must be null or point at a valid `Rect`.
    pub unsafe fn read_margins(ptr: *const Rect) -> Margins {
        match ptr.as_ref() {
            Some(rect) => Margins {
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
            },
            None => Margins::default(),
        }
    }
}

#[repr(C)]
pub struct OpenArchiveData {
    pub arc_name: *mut c_char,
    pub open_mode: c_int,
    pub open_result: c_int,
    pub cmt_buf: *mut c_char,
    pub cmt_buf_size: c_int,
    pub cmt_size: c_int,
    pub cmt_state: c_int,
}

#[repr(C)]
pub struct OpenArchiveDataW {
    pub arc_name: *mut u16,
    pub open_mode: c_int,
    pub open_result: c_int,
    pub cmt_buf: *mut u16,
    pub cmt_buf_size: c_int,
    pub cmt_size: c_int,
    pub cmt_state: c_int,
}

/// The two open-archive layouts, read and answered the same way.
pub trait OpenRequest {
    /// # Safety
    /// The archive name pointer must be null or NUL-terminated.
    unsafe fn archive(&self) -> String;
    fn mode(&self) -> c_int;
    fn set_result(&mut self, result: c_int);
}

impl OpenRequest for OpenArchiveData {
    unsafe fn archive(&self) -> String {
        read_ansi(self.arc_name).unwrap_or_default()
    }

    fn mode(&self) -> c_int {
        self.open_mode
    }

    fn set_result(&mut self, result: c_int) {
        self.open_result = result;
    }
}

impl OpenRequest for OpenArchiveDataW {
    unsafe fn archive(&self) -> String {
        read_wide(self.arc_name).unwrap_or_default()
    }

    fn mode(&self) -> c_int {
        self.open_mode
    }

    fn set_result(&mut self, result: c_int) {
        self.open_result = result;
    }
}

#[repr(C)]
pub struct HeaderData {
    pub arc_name: [c_char; MAX_PATH],
    pub file_name: [c_char; MAX_PATH],
    pub flags: c_int,
    pub pack_size: c_int,
    pub unp_size: c_int,
    pub host_os: c_int,
    pub file_crc: c_int,
    pub file_time: c_int,
    pub unp_ver: c_int,
    pub method: c_int,
    pub file_attr: c_int,
    pub cmt_buf: *mut c_char,
    pub cmt_buf_size: c_int,
    pub cmt_size: c_int,
    pub cmt_state: c_int,
}

impl Fill<PluginHeader> for HeaderData {
    fn fill(&mut self, header: &PluginHeader) {
        copy_ansi(&mut self.arc_name, &header.archive);
        copy_ansi(&mut self.file_name, &header.file_name);
        self.flags = 0;
        self.pack_size = header.packed_size as c_int;
        self.unp_size = header.size as c_int;
        self.host_os = 0;
        self.file_crc = header.crc as c_int;
        self.file_time = dos_date_time(header.modified);
        self.unp_ver = 0;
        self.method = 0;
        self.file_attr = header.attributes as c_int;
    }
}

#[repr(C)]
pub struct HeaderDataExW {
    pub arc_name: [u16; WIDE_PATH],
    pub file_name: [u16; WIDE_PATH],
    pub flags: c_int,
    pub pack_size: u32,
    pub pack_size_high: u32,
    pub unp_size: u32,
    pub unp_size_high: u32,
    pub host_os: c_int,
    pub file_crc: c_int,
    pub file_time: c_int,
    pub unp_ver: c_int,
    pub method: c_int,
    pub file_attr: c_int,
    pub cmt_buf: *mut c_char,
    pub cmt_buf_size: c_int,
    pub cmt_size: c_int,
    pub cmt_state: c_int,
    pub reserved: [c_char; 1024],
}

impl Fill<PluginHeader> for HeaderDataExW {
    fn fill(&mut self, header: &PluginHeader) {
        copy_wide(&mut self.arc_name, &header.archive);
        copy_wide(&mut self.file_name, &header.file_name);
        self.flags = 0;
        self.pack_size = header.packed_size as u32;
        self.pack_size_high = (header.packed_size >> 32) as u32;
        self.unp_size = header.size as u32;
        self.unp_size_high = (header.size >> 32) as u32;
        self.host_os = 0;
        self.file_crc = header.crc as c_int;
        self.file_time = dos_date_time(header.modified);
        self.unp_ver = 0;
        self.method = 0;
        self.file_attr = header.attributes as c_int;
    }
}

/// Copies `text` into a fixed array, truncating and NUL-terminating.
pub fn copy_ansi<const N: usize>(dst: &mut [c_char; N], text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(N.saturating_sub(1));
    for (slot, byte) in dst.iter_mut().zip(&bytes[..len]) {
        *slot = *byte as c_char;
    }
    if let Some(end) = dst.get_mut(len) {
        *end = 0;
    }
}

pub fn copy_wide<const N: usize>(dst: &mut [u16; N], text: &str) {
    let mut len = 0;
    for (slot, unit) in dst.iter_mut().take(N.saturating_sub(1)).zip(text.encode_utf16()) {
        *slot = unit;
        len += 1;
    }
    if let Some(end) = dst.get_mut(len) {
        *end = 0;
    }
}

/// NUL-terminated ANSI buffer of exactly `capacity` units holding `text`.
pub fn ansi_buffer(text: &str, capacity: usize) -> Vec<c_char> {
    let mut buf = vec![0 as c_char; capacity.max(1)];
    let len = text.len().min(buf.len() - 1);
    for (slot, byte) in buf.iter_mut().zip(&text.as_bytes()[..len]) {
        *slot = *byte as c_char;
    }
    buf
}

pub fn wide_buffer(text: &str, capacity: usize) -> Vec<u16> {
    let mut buf = vec![0u16; capacity.max(1)];
    let last = buf.len() - 1;
    for (slot, unit) in buf[..last].iter_mut().zip(text.encode_utf16()) {
        *slot = unit;
    }
    buf
}

pub fn from_ansi_buffer(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn from_wide_buffer(buf: &[u16]) -> String {
    let len = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string.
pub unsafe fn read_ansi(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// # Safety
/// `ptr` must be null or a NUL-terminated UTF-16 string.
pub unsafe fn read_wide(ptr: *const u16) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    Some(String::from_utf16_lossy(slice::from_raw_parts(ptr, len)))
}

/// Reads a list of NUL-separated names ending in an empty entry.
///
/// # Safety
/// `ptr` must be null or a double-NUL-terminated list.
pub unsafe fn read_ansi_list(mut ptr: *const c_char) -> Vec<String> {
    let mut items = Vec::new();
    while let Some(item) = read_ansi(ptr).filter(|s| !s.is_empty()) {
        ptr = ptr.add(CStr::from_ptr(ptr).to_bytes().len() + 1);
        items.push(item);
    }
    items
}

/// # Safety
/// `ptr` must be null or a double-NUL-terminated UTF-16 list.
pub unsafe fn read_wide_list(mut ptr: *const u16) -> Vec<String> {
    let mut items = Vec::new();
    while let Some(item) = read_wide(ptr).filter(|s| !s.is_empty()) {
        ptr = ptr.add(item.encode_utf16().count() + 1);
        items.push(item);
    }
    items
}

/// # Safety
/// `dst` must be null or writable for `capacity` units.
pub unsafe fn write_ansi(dst: *mut c_char, capacity: usize, text: &str) {
    if dst.is_null() || capacity == 0 {
        return;
    }
    let bytes = text.as_bytes();
    let len = bytes.len().min(capacity - 1);
    ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, dst, len);
    *dst.add(len) = 0;
}

/// # Safety
/// `dst` must be null or writable for `capacity` units.
pub unsafe fn write_wide(dst: *mut u16, capacity: usize, text: &str) {
    if dst.is_null() || capacity == 0 {
        return;
    }
    let units: Vec<u16> = text.encode_utf16().take(capacity - 1).collect();
    ptr::copy_nonoverlapping(units.as_ptr(), dst, units.len());
    *dst.add(units.len()) = 0;
}

/// Character unit of a native string: `c_char` for ANSI entry points,
/// `u16` for the wide ones.
pub trait NativeChar: Copy + 'static {
    /// Bytes per unit; buffer sizes given in bytes are divided by this.
    const WIDTH: usize;

    /// # Safety
    /// `ptr` must be null or NUL-terminated.
    unsafe fn read(ptr: *const Self) -> Option<String>;

    /// # Safety
    /// `ptr` must be null or a double-NUL-terminated list.
    unsafe fn read_list(ptr: *const Self) -> Vec<String>;

    /// # Safety
    /// `dst` must be null or writable for `capacity` units.
    unsafe fn write(dst: *mut Self, capacity: usize, text: &str);
}

impl NativeChar for c_char {
    const WIDTH: usize = 1;

    unsafe fn read(ptr: *const Self) -> Option<String> {
        read_ansi(ptr)
    }

    unsafe fn read_list(ptr: *const Self) -> Vec<String> {
        read_ansi_list(ptr)
    }

    unsafe fn write(dst: *mut Self, capacity: usize, text: &str) {
        write_ansi(dst, capacity, text)
    }
}

impl NativeChar for u16 {
    const WIDTH: usize = 2;

    unsafe fn read(ptr: *const Self) -> Option<String> {
        read_wide(ptr)
    }

    unsafe fn read_list(ptr: *const Self) -> Vec<String> {
        read_wide_list(ptr)
    }

    unsafe fn write(dst: *mut Self, capacity: usize, text: &str) {
        write_wide(dst, capacity, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_time_converts_both_ways() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let ft = FileTime::from_system_time(Some(time));
        assert_eq!(ft.to_system_time(), Some(time));
        assert_eq!(FileTime::from_system_time(None), FileTime::UNKNOWN);
        assert_eq!(FileTime::UNKNOWN.to_system_time(), None);
    }

    #[test]
    fn dos_time_packs_calendar_fields() {
        // 2000-01-02 03:04:06 UTC
        let time = UNIX_EPOCH + Duration::from_secs(946_782_246);
        let packed = dos_date_time(Some(time)) as u32;
        assert_eq!(packed >> 25, 20);
        assert_eq!((packed >> 21) & 0xF, 1);
        assert_eq!((packed >> 16) & 0x1F, 2);
        assert_eq!((packed >> 11) & 0x1F, 3);
        assert_eq!((packed >> 5) & 0x3F, 4);
        assert_eq!(packed & 0x1F, 3);
    }

    #[test]
    fn fixed_arrays_truncate_and_terminate() {
        let mut small = [1 as c_char; 4];
        copy_ansi(&mut small, "abcdef");
        assert_eq!(from_ansi_buffer(&small), "abc");
        let mut wide = [1u16; 4];
        copy_wide(&mut wide, "héllo");
        assert_eq!(from_wide_buffer(&wide), "hél");
    }

    #[test]
    fn raw_strings_round_trip() {
        let mut ansi = ansi_buffer("", 16);
        unsafe { write_ansi(ansi.as_mut_ptr(), ansi.len(), "remote/file") };
        assert_eq!(unsafe { read_ansi(ansi.as_ptr()) }.as_deref(), Some("remote/file"));

        let mut wide = wide_buffer("", 8);
        unsafe { write_wide(wide.as_mut_ptr(), wide.len(), "ünïcødé-long") };
        assert_eq!(unsafe { read_wide(wide.as_ptr()) }.as_deref(), Some("ünïcødé"));
        assert_eq!(unsafe { read_wide(ptr::null()) }, None);
    }

    #[test]
    fn name_lists_stop_at_empty_entry() {
        let raw: Vec<c_char> = b"a.txt\0dir/b.txt\0\0".iter().map(|&b| b as c_char).collect();
        assert_eq!(unsafe { read_ansi_list(raw.as_ptr()) }, vec!["a.txt", "dir/b.txt"]);
        let wide: Vec<u16> = "x\0yz\0\0".encode_utf16().collect();
        assert_eq!(unsafe { read_wide_list(wide.as_ptr()) }, vec!["x", "yz"]);
    }

    #[test]
    fn default_params_and_file_details_read_native_layouts() {
        let mut raw = RawDefaultParams {
            size: std::mem::size_of::<RawDefaultParams>() as c_int,
            version_low: 30,
            version_high: 2,
            ini_name: [0; MAX_PATH],
        };
        copy_ansi(&mut raw.ini_name, "/cfg/wincmd.ini");
        let params = unsafe { RawDefaultParams::read(&raw) }.unwrap();
        assert_eq!(params.interface_version, (2, 30));
        assert_eq!(params.ini_name, "/cfg/wincmd.ini");
        assert!(unsafe { RawDefaultParams::read(ptr::null()) }.is_none());

        let time = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let details = RawFileDetails {
            size1: 10,
            size2: -1,
            time1: FileTime::from_system_time(Some(time)),
            time2: FileTime::UNKNOWN,
            attributes1: 0x20,
            attributes2: 0,
        };
        let [first, second] = unsafe { RawFileDetails::read(&details) };
        assert_eq!((first.size, first.attributes, first.modified), (10, 0x20, Some(time)));
        assert_eq!((second.size, second.modified), (0, None));

        let modified = FileTime::from_system_time(Some(time));
        let times = unsafe { FileTime::read_times(ptr::null(), ptr::null(), &modified) };
        assert_eq!(times.created, None);
        assert_eq!(times.modified, Some(time));
    }

    #[test]
    fn find_data_carries_size_and_name() {
        let mut raw: FindDataW = unsafe { std::mem::zeroed() };
        raw.fill(&FindData::file("report.txt", (5 << 32) + 7));
        assert_eq!(raw.size_high, 5);
        assert_eq!(raw.size_low, 7);
        assert_eq!(from_wide_buffer(&raw.file_name), "report.txt");
        assert_eq!(raw.last_write_time, FileTime::UNKNOWN);
    }
}
