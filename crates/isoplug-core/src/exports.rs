//! Native entry points.
//!
//! The functions here translate native encodings and map failures to each
//! contract's documented return values. The `*_exports!` macros expand to the
//! `#[no_mangle]` symbols of one capability family; each takes an expression
//! of type `anyhow::Result<&Wrapper>` that is evaluated on every call.

use std::{
    ffi::{c_int, c_void},
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use anyhow::{anyhow, Result};
use isoplug_plugin_sdk::{
    content::{CompareResult, FieldType, FieldValue, SortOrder, ValueResult, SET_SUCCESS},
    fs::{CopyFlags, CustomIcon, ExecStatus, FindData, FsStatus, PreviewBitmap, StatusPhase},
    lister::ListerStatus,
    packer::{HeaderData as PluginHeader, OpenMode, PackerStatus, ProcessOperation},
};

use crate::{
    callbacks::{CallbackTable, ContentProgressProc},
    ffi::{
        self, Bool, FileTime, Fill, NativeChar, OpenRequest, RawDefaultParams, RawFileDetails,
        RawRemoteInfo, Rect, FALSE, MAX_PATH, TRUE,
    },
    handles::{Handle, INVALID_HANDLE},
    lifetime::{classify, FaultClass},
    shims::status_of,
    wrapper::Wrapper,
};

/// Runs an entry point body. Errors and panics never cross into native code;
/// `on_error` picks the failure value instead.
pub fn guard<T>(
    signature: &'static str,
    on_error: impl FnOnce(&anyhow::Error) -> T,
    body: impl FnOnce() -> Result<T>,
) -> T {
    let err = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => return value,
        Ok(Err(err)) => err,
        Err(_) => anyhow!("{signature} panicked"),
    };
    tracing::debug!(call = signature, "entry point failed: {err:#}");
    on_error(&err)
}

fn not_implemented(err: &anyhow::Error) -> bool {
    matches!(
        classify(err),
        FaultClass::NotImplementedOptional | FaultClass::NotImplementedMandatory
    )
}

fn fs_status(err: &anyhow::Error, fallback: FsStatus) -> c_int {
    if not_implemented(err) {
        FsStatus::NotSupported as c_int
    } else {
        fallback as c_int
    }
}

fn bool_result(value: bool) -> Bool {
    if value {
        TRUE
    } else {
        FALSE
    }
}

unsafe fn text<C: NativeChar>(ptr: *const C) -> String {
    C::read(ptr).unwrap_or_default()
}

/// Stores the host parameters of any `*SetDefaultParams` entry point.
///
/// # Safety
/// `params` must be null or point at a valid parameter block.
pub unsafe fn set_default_params(
    wrapper: Result<&Wrapper>,
    signature: &'static str,
    params: *const RawDefaultParams,
) {
    guard(signature, |_| (), || {
        let Some(params) = RawDefaultParams::read(params) else {
            return Ok(());
        };
        wrapper?.set_default_params(signature, params)
    })
}

/// # Safety
/// `dst` must be writable for `max_len` bytes.
unsafe fn write_detect_string(dst: *mut std::ffi::c_char, max_len: c_int, detect: Option<String>) {
    ffi::write_ansi(dst, max_len.max(0) as usize, detect.as_deref().unwrap_or_default());
}

// ---- file system ---------------------------------------------------------

pub fn fs_init(
    wrapper: Result<&Wrapper>,
    number: c_int,
    register: impl FnOnce(&mut CallbackTable),
) -> c_int {
    guard("FsInit", |_| -1, || {
        wrapper?.fs_init(number, register)?;
        Ok(0)
    })
}

pub fn fs_set_crypt_callback(
    wrapper: Result<&Wrapper>,
    crypto_number: c_int,
    flags: c_int,
    register: impl FnOnce(&mut CallbackTable),
) {
    guard("FsSetCryptCallback", |_| (), || {
        wrapper?.fs_set_crypt_callback(crypto_number, flags, register)
    })
}

/// # Safety
/// `path` must be NUL-terminated and `out` null or writable.
pub unsafe fn fs_find_first<C: NativeChar, D: Fill<FindData>>(
    wrapper: Result<&Wrapper>,
    path: *const C,
    out: *mut D,
) -> Handle {
    guard("FsFindFirst", |_| INVALID_HANDLE, || {
        match wrapper?.fs_find_first(&text(path))? {
            Some((handle, data)) => {
                if let Some(out) = out.as_mut() {
                    out.fill(&data);
                }
                Ok(handle)
            }
            None => Ok(INVALID_HANDLE),
        }
    })
}

/// # Safety
/// `out` must be null or writable.
pub unsafe fn fs_find_next<D: Fill<FindData>>(
    wrapper: Result<&Wrapper>,
    handle: Handle,
    out: *mut D,
) -> Bool {
    guard("FsFindNext", |_| FALSE, || {
        Ok(match wrapper?.fs_find_next(handle)? {
            Some(data) => {
                if let Some(out) = out.as_mut() {
                    out.fill(&data);
                }
                TRUE
            }
            None => FALSE,
        })
    })
}

pub fn fs_find_close(wrapper: Result<&Wrapper>, handle: Handle) -> c_int {
    guard("FsFindClose", |_| 0, || {
        wrapper?.fs_find_close(handle)?;
        Ok(0)
    })
}

/// # Safety
/// `local` must be a writable buffer of `MAX_PATH` units.
pub unsafe fn fs_get_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *const C,
    local: *mut C,
    flags: c_int,
    info: *const RawRemoteInfo,
) -> c_int {
    guard("FsGetFile", |err| fs_status(err, FsStatus::ReadError), || {
        let local_name = text(local);
        let (status, renamed) = wrapper?.fs_get_file(
            &text(remote),
            &local_name,
            CopyFlags(flags as u32),
            RawRemoteInfo::read(info),
        )?;
        if renamed != local_name {
            C::write(local, MAX_PATH, &renamed);
        }
        Ok(status as c_int)
    })
}

/// # Safety
/// `remote` must be a writable buffer of `MAX_PATH` units.
pub unsafe fn fs_put_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    local: *const C,
    remote: *mut C,
    flags: c_int,
) -> c_int {
    guard("FsPutFile", |err| fs_status(err, FsStatus::WriteError), || {
        let remote_name = text(remote);
        let flags = CopyFlags(flags as u32);
        let (status, renamed) = wrapper?.fs_put_file(&text(local), &remote_name, flags)?;
        if renamed != remote_name {
            C::write(remote, MAX_PATH, &renamed);
        }
        Ok(status as c_int)
    })
}

/// # Safety
/// Names must be NUL-terminated; `info` null or valid.
pub unsafe fn fs_ren_mov_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    old: *const C,
    new: *const C,
    move_file: Bool,
    overwrite: Bool,
    info: *const RawRemoteInfo,
) -> c_int {
    guard("FsRenMovFile", |err| fs_status(err, FsStatus::WriteError), || {
        let status = wrapper?.fs_ren_mov_file(
            &text(old),
            &text(new),
            move_file != FALSE,
            overwrite != FALSE,
            RawRemoteInfo::read(info),
        )?;
        Ok(status as c_int)
    })
}

/// File operations answering with a plain success flag.
#[derive(Debug, Clone, Copy)]
pub enum FsFlagOp {
    DeleteFile,
    MkDir,
    RemoveDir,
    Disconnect,
}

/// # Safety
/// `name` must be NUL-terminated.
pub unsafe fn fs_flag_op<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    op: FsFlagOp,
    name: *const C,
) -> Bool {
    let signature = match op {
        FsFlagOp::DeleteFile => "FsDeleteFile",
        FsFlagOp::MkDir => "FsMkDir",
        FsFlagOp::RemoveDir => "FsRemoveDir",
        FsFlagOp::Disconnect => "FsDisconnect",
    };
    guard(signature, |_| FALSE, || {
        let wrapper = wrapper?;
        let name = text(name);
        let done = match op {
            FsFlagOp::DeleteFile => wrapper.fs_delete_file(&name)?,
            FsFlagOp::MkDir => wrapper.fs_mk_dir(&name)?,
            FsFlagOp::RemoveDir => wrapper.fs_remove_dir(&name)?,
            FsFlagOp::Disconnect => wrapper.fs_disconnect(&name)?,
        };
        Ok(bool_result(done))
    })
}

/// # Safety
/// `remote` must be a writable buffer of `MAX_PATH` units.
pub unsafe fn fs_execute_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    window: isize,
    remote: *mut C,
    verb: *const C,
) -> c_int {
    guard("FsExecuteFile", |_| ExecStatus::Error as c_int, || {
        let remote_name = text(remote);
        let (status, renamed) = wrapper?.fs_execute_file(window, &remote_name, &text(verb))?;
        if renamed != remote_name {
            C::write(remote, MAX_PATH, &renamed);
        }
        Ok(status as c_int)
    })
}

/// # Safety
/// `dst` must be writable for `max_len` units.
pub unsafe fn fs_get_def_root_name<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    dst: *mut C,
    max_len: c_int,
) {
    guard("FsGetDefRootName", |_| (), || {
        let name = wrapper?.fs_def_root_name()?;
        C::write(dst, max_len.max(0) as usize, &name);
        Ok(())
    })
}

/// # Safety
/// `remote` must be NUL-terminated.
pub unsafe fn fs_set_attr<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *const C,
    attributes: c_int,
) -> Bool {
    guard("FsSetAttr", |_| FALSE, || {
        Ok(bool_result(wrapper?.fs_set_attr(&text(remote), attributes as u32)?))
    })
}

/// # Safety
/// `remote` must be NUL-terminated; each time null or valid.
pub unsafe fn fs_set_time<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *const C,
    created: *const FileTime,
    accessed: *const FileTime,
    modified: *const FileTime,
) -> Bool {
    guard("FsSetTime", |_| FALSE, || {
        let times = FileTime::read_times(created, accessed, modified);
        Ok(bool_result(wrapper?.fs_set_time(&text(remote), times)?))
    })
}

/// # Safety
/// `remote_dir` must be NUL-terminated.
pub unsafe fn fs_status_info<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote_dir: *const C,
    start_end: c_int,
    operation: c_int,
) {
    guard("FsStatusInfo", |_| (), || {
        wrapper?.fs_status_info(&text(remote_dir), StatusPhase::from_code(start_end), operation)
    })
}

/// # Safety
/// `remote` must be a writable buffer of `MAX_PATH` units; `icon` null or
/// writable.
pub unsafe fn fs_extract_custom_icon<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *mut C,
    flags: c_int,
    icon: *mut isize,
) -> c_int {
    guard("FsExtractCustomIcon", |_| CustomIcon::UseDefault.code(), || {
        let remote_name = text(remote);
        let (extracted, renamed) = wrapper?.fs_extract_custom_icon(&remote_name, flags)?;
        if renamed != remote_name {
            C::write(remote, MAX_PATH, &renamed);
        }
        if let Some(icon) = icon.as_mut() {
            *icon = extracted.handle();
        }
        Ok(extracted.code())
    })
}

/// # Safety
/// `remote` must be a writable buffer of `MAX_PATH` units; `bitmap` null or
/// writable.
pub unsafe fn fs_get_preview_bitmap<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *mut C,
    width: c_int,
    height: c_int,
    bitmap: *mut isize,
) -> c_int {
    guard("FsGetPreviewBitmap", |_| 0, || {
        let remote_name = text(remote);
        let (preview, renamed) = wrapper?.fs_get_preview_bitmap(&remote_name, width, height)?;
        match &preview.bitmap {
            PreviewBitmap::Extracted(handle) => {
                if let Some(bitmap) = bitmap.as_mut() {
                    *bitmap = *handle;
                }
            }
            PreviewBitmap::ExtractYourself(local)
            | PreviewBitmap::ExtractYourselfAndDelete(local) => {
                C::write(remote, MAX_PATH, local);
            }
            PreviewBitmap::None if renamed != remote_name => C::write(remote, MAX_PATH, &renamed),
            PreviewBitmap::None => {}
        }
        Ok(preview.code())
    })
}

/// # Safety
/// `remote` must be a writable buffer of `max_len` units.
pub unsafe fn fs_get_local_name<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    remote: *mut C,
    max_len: c_int,
) -> Bool {
    guard("FsGetLocalName", |_| FALSE, || {
        match wrapper?.fs_get_local_name(&text(remote))? {
            Some(local) => {
                C::write(remote, max_len.max(0) as usize, &local);
                Ok(TRUE)
            }
            None => Ok(FALSE),
        }
    })
}

pub fn fs_get_background_flags(wrapper: Result<&Wrapper>) -> c_int {
    guard("FsGetBackgroundFlags", |_| 0, || wrapper?.fs_background_flags())
}

pub fn fs_links_to_local_files(wrapper: Result<&Wrapper>) -> Bool {
    guard("FsLinksToLocalFiles", |_| FALSE, || {
        Ok(bool_result(wrapper?.fs_links_to_local_files()?))
    })
}

// ---- content -------------------------------------------------------------

/// # Safety
/// `name` and `units` must be writable for `max_len` bytes.
pub unsafe fn content_get_supported_field(
    wrapper: Result<&Wrapper>,
    index: c_int,
    name: *mut std::ffi::c_char,
    units: *mut std::ffi::c_char,
    max_len: c_int,
) -> c_int {
    guard("ContentGetSupportedField", |_| FieldType::NoMoreFields as c_int, || {
        let Some(field) = wrapper?.content_get_supported_field(index)? else {
            return Ok(FieldType::NoMoreFields as c_int);
        };
        let capacity = max_len.max(0) as usize;
        ffi::write_ansi(name, capacity, &field.name);
        ffi::write_ansi(units, capacity, &field.units);
        Ok(field.field_type as c_int)
    })
}

/// Writes `value` into the host's value buffer and returns its type code.
unsafe fn write_value<C: NativeChar>(
    dst: *mut c_void,
    max_len: usize,
    value: &FieldValue,
) -> c_int {
    if dst.is_null() {
        return ValueResult::FieldEmpty.code();
    }
    match value {
        FieldValue::Int32(v) => (dst as *mut i32).write_unaligned(*v),
        FieldValue::Int64(v) => (dst as *mut i64).write_unaligned(*v),
        FieldValue::Float(v) => (dst as *mut f64).write_unaligned(*v),
        FieldValue::Bool(v) => (dst as *mut i32).write_unaligned(i32::from(*v)),
        FieldValue::Text(v) => {
            C::write(dst as *mut C, max_len / C::WIDTH, v);
            return if C::WIDTH == 1 {
                FieldType::String as c_int
            } else {
                FieldType::WideString as c_int
            };
        }
    }
    value.field_type() as c_int
}

unsafe fn read_value<C: NativeChar>(field_type: c_int, src: *const c_void) -> Option<FieldValue> {
    if src.is_null() {
        return None;
    }
    match field_type {
        1 => Some(FieldValue::Int32((src as *const i32).read_unaligned())),
        2 => Some(FieldValue::Int64((src as *const i64).read_unaligned())),
        3 => Some(FieldValue::Float((src as *const f64).read_unaligned())),
        6 => Some(FieldValue::Bool((src as *const i32).read_unaligned() != 0)),
        8 => ffi::read_ansi(src as *const std::ffi::c_char).map(FieldValue::Text),
        11 => ffi::read_wide(src as *const u16).map(FieldValue::Text),
        _ => C::read(src as *const C).map(FieldValue::Text),
    }
}

/// # Safety
/// `file` must be NUL-terminated and `value` writable for `max_len` bytes.
pub unsafe fn content_get_value<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    file: *const C,
    field: c_int,
    unit: c_int,
    value: *mut c_void,
    max_len: c_int,
    flags: c_int,
) -> c_int {
    let on_error = |err: &anyhow::Error| {
        if not_implemented(err) {
            ValueResult::NoSuchField.code()
        } else {
            ValueResult::FileError.code()
        }
    };
    guard("ContentGetValue", on_error, || {
        match wrapper?.content_get_value(&text(file), field, unit, flags)? {
            ValueResult::Value(v) => Ok(write_value::<C>(value, max_len.max(0) as usize, &v)),
            other => Ok(other.code()),
        }
    })
}

/// # Safety
/// `file` must be NUL-terminated.
pub unsafe fn content_stop_get_value<C: NativeChar>(wrapper: Result<&Wrapper>, file: *const C) {
    guard("ContentStopGetValue", |_| (), || wrapper?.content_stop_get_value(&text(file)))
}

pub fn content_plugin_unloading(wrapper: Result<&Wrapper>) {
    guard("ContentPluginUnloading", |_| (), || wrapper?.content_plugin_unloading())
}

/// # Safety
/// `file` must be NUL-terminated and `value` null or of `field_type`.
pub unsafe fn content_set_value<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    file: *const C,
    field: c_int,
    unit: c_int,
    field_type: c_int,
    value: *const c_void,
    flags: c_int,
) -> c_int {
    guard("ContentSetValue", |_| ValueResult::FileError.code(), || {
        let value = read_value::<C>(field_type, value);
        let done = wrapper?.content_set_value(&text(file), field, unit, value, flags)?;
        Ok(if done {
            SET_SUCCESS
        } else {
            ValueResult::FileError.code()
        })
    })
}

pub fn content_get_default_sort_order(wrapper: Result<&Wrapper>, field: c_int) -> c_int {
    guard("ContentGetDefaultSortOrder", |_| SortOrder::Ascending as c_int, || {
        Ok(wrapper?.content_get_default_sort_order(field)? as c_int)
    })
}

pub fn content_get_supported_field_flags(wrapper: Result<&Wrapper>, field: c_int) -> c_int {
    guard("ContentGetSupportedFieldFlags", |_| 0, || {
        wrapper?.content_get_supported_field_flags(field)
    })
}

/// # Safety
/// Every buffer must be writable for `max_len` units.
pub unsafe fn content_get_default_view<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    contents: *mut C,
    headers: *mut C,
    widths: *mut C,
    options: *mut C,
    max_len: c_int,
) -> Bool {
    guard("ContentGetDefaultView", |_| FALSE, || {
        let capacity = max_len.max(0) as usize;
        let Some(view) = wrapper?.content_get_default_view(capacity)? else {
            return Ok(FALSE);
        };
        C::write(contents, capacity, &view.contents);
        C::write(headers, capacity, &view.headers);
        C::write(widths, capacity, &view.widths);
        C::write(options, capacity, &view.options);
        Ok(TRUE)
    })
}

/// # Safety
/// `value` must be null or of `field_type` and writable for `max_len` bytes;
/// `language` null or NUL-terminated.
#[allow(clippy::too_many_arguments)]
pub unsafe fn content_edit_value(
    wrapper: Result<&Wrapper>,
    parent: isize,
    field: c_int,
    unit: c_int,
    field_type: c_int,
    value: *mut c_void,
    max_len: c_int,
    flags: c_int,
    language: *const std::ffi::c_char,
) -> c_int {
    guard("ContentEditValue", |_| ValueResult::NoSuchField.code(), || {
        let current = read_value::<std::ffi::c_char>(field_type, value);
        let language = text(language);
        let (code, edited) =
            wrapper?.content_edit_value(parent, field, unit, current, flags, &language)?;
        if let (SET_SUCCESS, Some(edited)) = (code, &edited) {
            write_value::<std::ffi::c_char>(value, max_len.max(0) as usize, edited);
        }
        Ok(code)
    })
}

/// # Safety
/// `path` must be NUL-terminated.
pub unsafe fn content_send_state_information<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    state: c_int,
    path: *const C,
) {
    guard("ContentSendStateInformation", |_| (), || {
        wrapper?.content_send_state_information(state, &text(path))
    })
}

/// # Safety
/// Names must be NUL-terminated; `details` null or valid.
pub unsafe fn content_compare_files<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    progress: Option<ContentProgressProc>,
    index: c_int,
    first: *const C,
    second: *const C,
    details: *const RawFileDetails,
) -> c_int {
    let on_error = |err: &anyhow::Error| {
        if not_implemented(err) {
            CompareResult::CannotCompare.code()
        } else {
            CompareResult::FileOpenError.code()
        }
    };
    guard("ContentCompareFiles", on_error, || {
        let details = RawFileDetails::read(details);
        let result = wrapper?.content_compare_files(
            progress,
            index,
            &text(first),
            &text(second),
            details,
        )?;
        Ok(result.code())
    })
}

/// # Safety
/// `dst` must be writable for `max_len` bytes.
pub unsafe fn content_get_detect_string(
    wrapper: Result<&Wrapper>,
    dst: *mut std::ffi::c_char,
    max_len: c_int,
) {
    guard("ContentGetDetectString", |_| (), || {
        write_detect_string(dst, max_len, wrapper?.content_detect_string()?);
        Ok(())
    })
}

// ---- packer --------------------------------------------------------------

/// Returns the session handle, or 0 with `open_result` set on failure.
///
/// # Safety
/// `data` must be null or a valid open-archive record.
pub unsafe fn open_archive<D: OpenRequest>(wrapper: Result<&Wrapper>, data: *mut D) -> Handle {
    let Some(data) = data.as_mut() else {
        return 0;
    };
    let (archive, mode) = (data.archive(), OpenMode::from_code(data.mode()));
    let (handle, result) = guard(
        "OpenArchive",
        |err| (0, status_of(err).code()),
        || Ok((wrapper?.open_archive(&archive, mode)?, PackerStatus::Success.code())),
    );
    data.set_result(result);
    handle
}

/// # Safety
/// `out` must be null or writable.
pub unsafe fn read_header<D: Fill<PluginHeader>>(
    wrapper: Result<&Wrapper>,
    handle: Handle,
    out: *mut D,
) -> c_int {
    guard("ReadHeader", |err| status_of(err).code(), || {
        Ok(match wrapper?.read_header(handle)? {
            Some(header) => {
                if let Some(out) = out.as_mut() {
                    out.fill(&header);
                }
                PackerStatus::Success.code()
            }
            None => PackerStatus::EndArchive.code(),
        })
    })
}

/// # Safety
/// Paths must be null or NUL-terminated.
pub unsafe fn process_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    handle: Handle,
    operation: c_int,
    dest_path: *const C,
    dest_name: *const C,
) -> c_int {
    guard("ProcessFile", |err| status_of(err).code(), || {
        let dest = match (C::read(dest_path), C::read(dest_name)) {
            (Some(path), Some(name)) if !path.is_empty() => {
                Some(Path::new(&path).join(name).to_string_lossy().into_owned())
            }
            (_, Some(name)) => Some(name),
            (path, None) => path,
        };
        let status = wrapper?.process_file(
            handle,
            ProcessOperation::from_code(operation),
            dest.as_deref(),
        )?;
        Ok(status.code())
    })
}

pub fn close_archive(wrapper: Result<&Wrapper>, handle: Handle) -> c_int {
    guard("CloseArchive", |err| status_of(err).code(), || {
        Ok(wrapper?.close_archive(handle)?.code())
    })
}

pub fn set_packer_callbacks(wrapper: Result<&Wrapper>, register: impl FnOnce(&mut CallbackTable)) {
    guard("SetProcessDataProc", |_| (), || wrapper?.set_packer_callbacks(register))
}

pub fn pk_set_crypt_callback(
    wrapper: Result<&Wrapper>,
    crypto_number: c_int,
    flags: c_int,
    register: impl FnOnce(&mut CallbackTable),
) -> c_int {
    guard("PkSetCryptCallback", |err| status_of(err).code(), || {
        wrapper?.pk_set_crypt_callback(crypto_number, flags, register)?;
        Ok(PackerStatus::Success.code())
    })
}

pub fn get_packer_caps(wrapper: Result<&Wrapper>) -> c_int {
    guard("GetPackerCaps", |_| 0, || wrapper?.packer_caps())
}

/// # Safety
/// Names must be null or NUL-terminated; `files` a double-NUL-terminated list.
pub unsafe fn pack_files<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    archive: *const C,
    sub_path: *const C,
    source_path: *const C,
    files: *const C,
    flags: c_int,
) -> c_int {
    guard("PackFiles", |err| status_of(err).code(), || {
        let sub_path = C::read(sub_path).filter(|s| !s.is_empty());
        let status = wrapper?.pack_files(
            &text(archive),
            sub_path.as_deref(),
            &text(source_path),
            C::read_list(files),
            flags,
        )?;
        Ok(status.code())
    })
}

/// # Safety
/// `archive` must be NUL-terminated; `files` a double-NUL-terminated list.
pub unsafe fn delete_files<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    archive: *const C,
    files: *const C,
) -> c_int {
    guard("DeleteFiles", |err| status_of(err).code(), || {
        Ok(wrapper?.delete_files(&text(archive), C::read_list(files))?.code())
    })
}

/// # Safety
/// `file` must be NUL-terminated.
pub unsafe fn can_you_handle_this_file<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    file: *const C,
) -> Bool {
    guard("CanYouHandleThisFile", |_| FALSE, || {
        Ok(bool_result(wrapper?.can_you_handle_this_file(&text(file))?))
    })
}

pub fn configure_packer(wrapper: Result<&Wrapper>, parent: isize) {
    guard("ConfigurePacker", |_| (), || wrapper?.configure_packer(parent))
}

/// Returns the stream handle, or 0 on failure.
///
/// # Safety
/// `file` must be NUL-terminated.
pub unsafe fn start_mem_pack<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    options: c_int,
    file: *const C,
) -> Handle {
    guard("StartMemPack", |_| 0, || wrapper?.start_mem_pack(options, &text(file)))
}

/// # Safety
/// `input` must be readable for `in_len` bytes, `output` writable for
/// `out_len` bytes; `taken` and `written` null or writable.
#[allow(clippy::too_many_arguments)]
pub unsafe fn pack_to_mem(
    wrapper: Result<&Wrapper>,
    handle: Handle,
    input: *const u8,
    in_len: c_int,
    taken: *mut c_int,
    output: *mut u8,
    out_len: c_int,
    written: *mut c_int,
    seek_by: c_int,
) -> c_int {
    guard("PackToMem", |err| status_of(err).code(), || {
        let input = if input.is_null() || in_len <= 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(input, in_len as usize)
        };
        let capacity = if output.is_null() { 0 } else { out_len.max(0) as usize };
        let chunk = wrapper?.pack_to_mem(handle, input, capacity, seek_by)?;
        let produced = chunk.output.len().min(capacity);
        if produced > 0 {
            std::ptr::copy_nonoverlapping(chunk.output.as_ptr(), output, produced);
        }
        if let Some(taken) = taken.as_mut() {
            *taken = chunk.taken.min(input.len()) as c_int;
        }
        if let Some(written) = written.as_mut() {
            *written = produced as c_int;
        }
        Ok(chunk.code())
    })
}

pub fn done_mem_pack(wrapper: Result<&Wrapper>, handle: Handle) -> c_int {
    guard("DoneMemPack", |err| status_of(err).code(), || {
        Ok(wrapper?.done_mem_pack(handle)?.code())
    })
}

pub fn get_background_flags(wrapper: Result<&Wrapper>) -> c_int {
    guard("GetBackgroundFlags", |_| 0, || wrapper?.packer_background_flags())
}

// ---- lister --------------------------------------------------------------

/// # Safety
/// `file` must be NUL-terminated.
pub unsafe fn list_load<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    parent: isize,
    file: *const C,
    flags: c_int,
) -> isize {
    guard("ListLoad", |_| 0, || {
        Ok(wrapper?.list_load(parent, &text(file), flags)?.unwrap_or(0))
    })
}

/// # Safety
/// `file` must be NUL-terminated.
pub unsafe fn list_load_next<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    parent: isize,
    window: isize,
    file: *const C,
    flags: c_int,
) -> c_int {
    guard("ListLoadNext", |_| ListerStatus::Error as c_int, || {
        Ok(wrapper?.list_load_next(window, parent, &text(file), flags)? as c_int)
    })
}

pub fn list_close_window(wrapper: Result<&Wrapper>, window: isize) {
    guard("ListCloseWindow", |_| (), || wrapper?.list_close_window(window))
}

/// # Safety
/// `search` must be NUL-terminated.
pub unsafe fn list_search_text<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    window: isize,
    search: *const C,
    params: c_int,
) -> c_int {
    guard("ListSearchText", |_| ListerStatus::Error as c_int, || {
        Ok(wrapper?.list_search_text(window, &text(search), params)? as c_int)
    })
}

pub fn list_send_command(
    wrapper: Result<&Wrapper>,
    window: isize,
    command: c_int,
    parameter: c_int,
) -> c_int {
    guard("ListSendCommand", |_| ListerStatus::Error as c_int, || {
        Ok(wrapper?.list_send_command(window, command, parameter)? as c_int)
    })
}

/// # Safety
/// Names must be null or NUL-terminated; `margins` null or valid.
pub unsafe fn list_print<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    window: isize,
    file: *const C,
    printer: *const C,
    flags: c_int,
    margins: *const Rect,
) -> c_int {
    guard("ListPrint", |_| ListerStatus::Error as c_int, || {
        let margins = Rect::read_margins(margins);
        Ok(wrapper?.list_print(window, &text(file), &text(printer), flags, margins)? as c_int)
    })
}

pub fn list_notification_received(
    wrapper: Result<&Wrapper>,
    window: isize,
    message: c_int,
    wparam: isize,
    lparam: isize,
) -> c_int {
    guard("ListNotificationReceived", |_| 0, || {
        wrapper?.list_notification_received(window, message, wparam, lparam)
    })
}

/// # Safety
/// `file` must be NUL-terminated; `content` null or readable for
/// `content_len` bytes.
pub unsafe fn list_get_preview_bitmap<C: NativeChar>(
    wrapper: Result<&Wrapper>,
    file: *const C,
    width: c_int,
    height: c_int,
    content: *const u8,
    content_len: c_int,
) -> isize {
    guard("ListGetPreviewBitmap", |_| 0, || {
        let content = if content.is_null() || content_len <= 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(content, content_len as usize)
        };
        Ok(wrapper?.list_get_preview_bitmap(&text(file), width, height, content)?.unwrap_or(0))
    })
}

pub fn list_search_dialog(wrapper: Result<&Wrapper>, window: isize, find_next: c_int) -> c_int {
    guard("ListSearchDialog", |_| ListerStatus::Error as c_int, || {
        Ok(wrapper?.list_search_dialog(window, find_next != 0)? as c_int)
    })
}

/// # Safety
/// `dst` must be writable for `max_len` bytes.
pub unsafe fn list_get_detect_string(
    wrapper: Result<&Wrapper>,
    dst: *mut std::ffi::c_char,
    max_len: c_int,
) {
    guard("ListGetDetectString", |_| (), || {
        write_detect_string(dst, max_len, wrapper?.list_detect_string()?);
        Ok(())
    })
}

// ---- quick search --------------------------------------------------------

/// # Safety
/// Both strings must be NUL-terminated UTF-16.
pub unsafe fn match_file(
    wrapper: Result<&Wrapper>,
    filter: *const u16,
    file_name: *const u16,
) -> Bool {
    guard("MatchFileW", |_| FALSE, || {
        Ok(bool_result(wrapper?.match_file(&text(filter), &text(file_name))?))
    })
}

pub fn match_get_set_options(wrapper: Result<&Wrapper>, status: c_int) -> c_int {
    guard("MatchGetSetOptions", |_| 0, || wrapper?.match_get_set_options(status))
}

/// File-system entry points, including the embedded `FsContent*` exports.
#[macro_export]
macro_rules! fs_exports {
    ($wrapper:expr) => {
        #[no_mangle]
        pub unsafe extern "system" fn FsInit(
            number: ::std::ffi::c_int,
            progress: Option<$crate::callbacks::ProgressProc>,
            log: Option<$crate::callbacks::LogProc>,
            request: Option<$crate::callbacks::RequestProc>,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_init($wrapper, number, move |table| {
                table.progress.register(progress, None);
                table.log.register(log, None);
                table.request.register(request, None);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsInitW(
            number: ::std::ffi::c_int,
            progress: Option<$crate::callbacks::ProgressProcW>,
            log: Option<$crate::callbacks::LogProcW>,
            request: Option<$crate::callbacks::RequestProcW>,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_init($wrapper, number, move |table| {
                table.progress.register(None, progress);
                table.log.register(None, log);
                table.request.register(None, request);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetCryptCallback(
            callback: Option<$crate::callbacks::CryptProc>,
            crypto_number: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) {
            $crate::exports::fs_set_crypt_callback($wrapper, crypto_number, flags, move |table| {
                table.crypt.register(callback, None);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetCryptCallbackW(
            callback: Option<$crate::callbacks::CryptProcW>,
            crypto_number: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) {
            $crate::exports::fs_set_crypt_callback($wrapper, crypto_number, flags, move |table| {
                table.crypt.register(None, callback);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsFindFirst(
            path: *const ::std::ffi::c_char,
            data: *mut $crate::ffi::FindDataA,
        ) -> isize {
            $crate::exports::fs_find_first($wrapper, path, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsFindFirstW(
            path: *const u16,
            data: *mut $crate::ffi::FindDataW,
        ) -> isize {
            $crate::exports::fs_find_first($wrapper, path, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsFindNext(
            handle: isize,
            data: *mut $crate::ffi::FindDataA,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_find_next($wrapper, handle, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsFindNextW(
            handle: isize,
            data: *mut $crate::ffi::FindDataW,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_find_next($wrapper, handle, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsFindClose(handle: isize) -> ::std::ffi::c_int {
            $crate::exports::fs_find_close($wrapper, handle)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetFile(
            remote: *const ::std::ffi::c_char,
            local: *mut ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
            info: *const $crate::ffi::RawRemoteInfo,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_get_file($wrapper, remote, local, flags, info)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetFileW(
            remote: *const u16,
            local: *mut u16,
            flags: ::std::ffi::c_int,
            info: *const $crate::ffi::RawRemoteInfo,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_get_file($wrapper, remote, local, flags, info)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsPutFile(
            local: *const ::std::ffi::c_char,
            remote: *mut ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_put_file($wrapper, local, remote, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsPutFileW(
            local: *const u16,
            remote: *mut u16,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_put_file($wrapper, local, remote, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsRenMovFile(
            old: *const ::std::ffi::c_char,
            new: *const ::std::ffi::c_char,
            move_file: $crate::ffi::Bool,
            overwrite: $crate::ffi::Bool,
            info: *const $crate::ffi::RawRemoteInfo,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_ren_mov_file($wrapper, old, new, move_file, overwrite, info)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsRenMovFileW(
            old: *const u16,
            new: *const u16,
            move_file: $crate::ffi::Bool,
            overwrite: $crate::ffi::Bool,
            info: *const $crate::ffi::RawRemoteInfo,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_ren_mov_file($wrapper, old, new, move_file, overwrite, info)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsDeleteFile(
            name: *const ::std::ffi::c_char,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::DeleteFile, name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsDeleteFileW(name: *const u16) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::DeleteFile, name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsMkDir(
            path: *const ::std::ffi::c_char,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::MkDir, path)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsMkDirW(path: *const u16) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::MkDir, path)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsRemoveDir(
            name: *const ::std::ffi::c_char,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::RemoveDir, name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsRemoveDirW(name: *const u16) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::RemoveDir, name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsDisconnect(
            root: *const ::std::ffi::c_char,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::Disconnect, root)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsDisconnectW(root: *const u16) -> $crate::ffi::Bool {
            $crate::exports::fs_flag_op($wrapper, $crate::exports::FsFlagOp::Disconnect, root)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsExecuteFile(
            window: isize,
            remote: *mut ::std::ffi::c_char,
            verb: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_execute_file($wrapper, window, remote, verb)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsExecuteFileW(
            window: isize,
            remote: *mut u16,
            verb: *const u16,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_execute_file($wrapper, window, remote, verb)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetDefRootName(
            name: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) {
            $crate::exports::fs_get_def_root_name($wrapper, name, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetSupportedField(
            index: ::std::ffi::c_int,
            name: *mut ::std::ffi::c_char,
            units: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_supported_field($wrapper, index, name, units, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetValue(
            file: *const ::std::ffi::c_char,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            value: *mut ::std::ffi::c_void,
            max_len: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_value($wrapper, file, field, unit, value, max_len, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetValueW(
            file: *const u16,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            value: *mut ::std::ffi::c_void,
            max_len: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_value($wrapper, file, field, unit, value, max_len, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetAttr(
            remote: *const ::std::ffi::c_char,
            attributes: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_set_attr($wrapper, remote, attributes)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetAttrW(
            remote: *const u16,
            attributes: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_set_attr($wrapper, remote, attributes)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetTime(
            remote: *const ::std::ffi::c_char,
            created: *const $crate::ffi::FileTime,
            accessed: *const $crate::ffi::FileTime,
            modified: *const $crate::ffi::FileTime,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_set_time($wrapper, remote, created, accessed, modified)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetTimeW(
            remote: *const u16,
            created: *const $crate::ffi::FileTime,
            accessed: *const $crate::ffi::FileTime,
            modified: *const $crate::ffi::FileTime,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_set_time($wrapper, remote, created, accessed, modified)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsStatusInfo(
            remote_dir: *const ::std::ffi::c_char,
            start_end: ::std::ffi::c_int,
            operation: ::std::ffi::c_int,
        ) {
            $crate::exports::fs_status_info($wrapper, remote_dir, start_end, operation)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsStatusInfoW(
            remote_dir: *const u16,
            start_end: ::std::ffi::c_int,
            operation: ::std::ffi::c_int,
        ) {
            $crate::exports::fs_status_info($wrapper, remote_dir, start_end, operation)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsExtractCustomIcon(
            remote: *mut ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
            icon: *mut isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_extract_custom_icon($wrapper, remote, flags, icon)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsExtractCustomIconW(
            remote: *mut u16,
            flags: ::std::ffi::c_int,
            icon: *mut isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_extract_custom_icon($wrapper, remote, flags, icon)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetPreviewBitmap(
            remote: *mut ::std::ffi::c_char,
            width: ::std::ffi::c_int,
            height: ::std::ffi::c_int,
            bitmap: *mut isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_get_preview_bitmap($wrapper, remote, width, height, bitmap)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetPreviewBitmapW(
            remote: *mut u16,
            width: ::std::ffi::c_int,
            height: ::std::ffi::c_int,
            bitmap: *mut isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::fs_get_preview_bitmap($wrapper, remote, width, height, bitmap)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetLocalName(
            remote: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_get_local_name($wrapper, remote, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetLocalNameW(
            remote: *mut u16,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::fs_get_local_name($wrapper, remote, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsGetBackgroundFlags() -> ::std::ffi::c_int {
            $crate::exports::fs_get_background_flags($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsLinksToLocalFiles() -> $crate::ffi::Bool {
            $crate::exports::fs_links_to_local_files($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsSetDefaultParams(
            params: *const $crate::ffi::RawDefaultParams,
        ) {
            $crate::exports::set_default_params($wrapper, "FsSetDefaultParams", params)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentStopGetValue(
            file: *const ::std::ffi::c_char,
        ) {
            $crate::exports::content_stop_get_value($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentStopGetValueW(
            file: *const u16,
        ) {
            $crate::exports::content_stop_get_value($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentPluginUnloading() {
            $crate::exports::content_plugin_unloading($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetDefaultSortOrder(
            field: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_default_sort_order($wrapper, field)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetSupportedFieldFlags(
            field: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_supported_field_flags($wrapper, field)
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentSetValue(
            file: *const ::std::ffi::c_char,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            field_type: ::std::ffi::c_int,
            value: *const ::std::ffi::c_void,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_set_value(
                $wrapper,
                file,
                field,
                unit,
                field_type,
                value,
                flags,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentSetValueW(
            file: *const u16,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            field_type: ::std::ffi::c_int,
            value: *const ::std::ffi::c_void,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_set_value(
                $wrapper,
                file,
                field,
                unit,
                field_type,
                value,
                flags,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetDefaultView(
            contents: *mut ::std::ffi::c_char,
            headers: *mut ::std::ffi::c_char,
            widths: *mut ::std::ffi::c_char,
            options: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::content_get_default_view(
                $wrapper,
                contents,
                headers,
                widths,
                options,
                max_len,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn FsContentGetDefaultViewW(
            contents: *mut u16,
            headers: *mut u16,
            widths: *mut u16,
            options: *mut u16,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::content_get_default_view(
                $wrapper,
                contents,
                headers,
                widths,
                options,
                max_len,
            )
        }
    };
}

/// Content (metadata) entry points.
#[macro_export]
macro_rules! content_exports {
    ($wrapper:expr) => {
        #[no_mangle]
        pub unsafe extern "system" fn ContentGetSupportedField(
            index: ::std::ffi::c_int,
            name: *mut ::std::ffi::c_char,
            units: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_supported_field($wrapper, index, name, units, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetValue(
            file: *const ::std::ffi::c_char,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            value: *mut ::std::ffi::c_void,
            max_len: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_value($wrapper, file, field, unit, value, max_len, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetValueW(
            file: *const u16,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            value: *mut ::std::ffi::c_void,
            max_len: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_value($wrapper, file, field, unit, value, max_len, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentStopGetValue(file: *const ::std::ffi::c_char) {
            $crate::exports::content_stop_get_value($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentStopGetValueW(file: *const u16) {
            $crate::exports::content_stop_get_value($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentPluginUnloading() {
            $crate::exports::content_plugin_unloading($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentSetValue(
            file: *const ::std::ffi::c_char,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            field_type: ::std::ffi::c_int,
            value: *const ::std::ffi::c_void,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_set_value(
                $wrapper,
                file,
                field,
                unit,
                field_type,
                value,
                flags,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentSetValueW(
            file: *const u16,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            field_type: ::std::ffi::c_int,
            value: *const ::std::ffi::c_void,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_set_value(
                $wrapper,
                file,
                field,
                unit,
                field_type,
                value,
                flags,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetDefaultSortOrder(
            field: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_default_sort_order($wrapper, field)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetSupportedFieldFlags(
            field: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_get_supported_field_flags($wrapper, field)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentEditValue(
            parent: isize,
            field: ::std::ffi::c_int,
            unit: ::std::ffi::c_int,
            field_type: ::std::ffi::c_int,
            value: *mut ::std::ffi::c_void,
            max_len: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
            language: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_edit_value(
                $wrapper,
                parent,
                field,
                unit,
                field_type,
                value,
                max_len,
                flags,
                language,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentSendStateInformation(
            state: ::std::ffi::c_int,
            path: *const ::std::ffi::c_char,
        ) {
            $crate::exports::content_send_state_information($wrapper, state, path)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentSendStateInformationW(
            state: ::std::ffi::c_int,
            path: *const u16,
        ) {
            $crate::exports::content_send_state_information($wrapper, state, path)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentCompareFiles(
            progress: Option<$crate::callbacks::ContentProgressProc>,
            index: ::std::ffi::c_int,
            first: *const ::std::ffi::c_char,
            second: *const ::std::ffi::c_char,
            details: *const $crate::ffi::RawFileDetails,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_compare_files(
                $wrapper,
                progress,
                index,
                first,
                second,
                details,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentCompareFilesW(
            progress: Option<$crate::callbacks::ContentProgressProc>,
            index: ::std::ffi::c_int,
            first: *const u16,
            second: *const u16,
            details: *const $crate::ffi::RawFileDetails,
        ) -> ::std::ffi::c_int {
            $crate::exports::content_compare_files(
                $wrapper,
                progress,
                index,
                first,
                second,
                details,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetDefaultView(
            contents: *mut ::std::ffi::c_char,
            headers: *mut ::std::ffi::c_char,
            widths: *mut ::std::ffi::c_char,
            options: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::content_get_default_view(
                $wrapper,
                contents,
                headers,
                widths,
                options,
                max_len,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetDefaultViewW(
            contents: *mut u16,
            headers: *mut u16,
            widths: *mut u16,
            options: *mut u16,
            max_len: ::std::ffi::c_int,
        ) -> $crate::ffi::Bool {
            $crate::exports::content_get_default_view(
                $wrapper,
                contents,
                headers,
                widths,
                options,
                max_len,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentGetDetectString(
            detect: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) {
            $crate::exports::content_get_detect_string($wrapper, detect, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ContentSetDefaultParams(
            params: *const $crate::ffi::RawDefaultParams,
        ) {
            $crate::exports::set_default_params($wrapper, "ContentSetDefaultParams", params)
        }
    };
}

/// Archive (packer) entry points.
#[macro_export]
macro_rules! packer_exports {
    ($wrapper:expr) => {
        #[no_mangle]
        pub unsafe extern "system" fn OpenArchive(
            data: *mut $crate::ffi::OpenArchiveData,
        ) -> isize {
            $crate::exports::open_archive($wrapper, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn OpenArchiveW(
            data: *mut $crate::ffi::OpenArchiveDataW,
        ) -> isize {
            $crate::exports::open_archive($wrapper, data)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ReadHeader(
            handle: isize,
            header: *mut $crate::ffi::HeaderData,
        ) -> ::std::ffi::c_int {
            $crate::exports::read_header($wrapper, handle, header)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ReadHeaderExW(
            handle: isize,
            header: *mut $crate::ffi::HeaderDataExW,
        ) -> ::std::ffi::c_int {
            $crate::exports::read_header($wrapper, handle, header)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ProcessFile(
            handle: isize,
            operation: ::std::ffi::c_int,
            dest_path: *const ::std::ffi::c_char,
            dest_name: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            $crate::exports::process_file($wrapper, handle, operation, dest_path, dest_name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ProcessFileW(
            handle: isize,
            operation: ::std::ffi::c_int,
            dest_path: *const u16,
            dest_name: *const u16,
        ) -> ::std::ffi::c_int {
            $crate::exports::process_file($wrapper, handle, operation, dest_path, dest_name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn CloseArchive(handle: isize) -> ::std::ffi::c_int {
            $crate::exports::close_archive($wrapper, handle)
        }

        #[no_mangle]
        pub unsafe extern "system" fn SetChangeVolProc(
            _handle: isize,
            callback: Option<$crate::callbacks::ChangeVolProc>,
        ) {
            $crate::exports::set_packer_callbacks($wrapper, move |table| {
                table.change_volume.register(callback, None);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn SetChangeVolProcW(
            _handle: isize,
            callback: Option<$crate::callbacks::ChangeVolProcW>,
        ) {
            $crate::exports::set_packer_callbacks($wrapper, move |table| {
                table.change_volume.register(None, callback);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn SetProcessDataProc(
            _handle: isize,
            callback: Option<$crate::callbacks::ProcessDataProc>,
        ) {
            $crate::exports::set_packer_callbacks($wrapper, move |table| {
                table.process_data.register(callback, None);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn SetProcessDataProcW(
            _handle: isize,
            callback: Option<$crate::callbacks::ProcessDataProcW>,
        ) {
            $crate::exports::set_packer_callbacks($wrapper, move |table| {
                table.process_data.register(None, callback);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn PkSetCryptCallback(
            callback: Option<$crate::callbacks::PkCryptProc>,
            crypto_number: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::pk_set_crypt_callback($wrapper, crypto_number, flags, move |table| {
                table.pk_crypt.register(callback, None);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn PkSetCryptCallbackW(
            callback: Option<$crate::callbacks::PkCryptProcW>,
            crypto_number: ::std::ffi::c_int,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::pk_set_crypt_callback($wrapper, crypto_number, flags, move |table| {
                table.pk_crypt.register(None, callback);
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn GetPackerCaps() -> ::std::ffi::c_int {
            $crate::exports::get_packer_caps($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn PackFiles(
            archive: *const ::std::ffi::c_char,
            sub_path: *const ::std::ffi::c_char,
            source_path: *const ::std::ffi::c_char,
            files: *const ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::pack_files($wrapper, archive, sub_path, source_path, files, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn PackFilesW(
            archive: *const u16,
            sub_path: *const u16,
            source_path: *const u16,
            files: *const u16,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::pack_files($wrapper, archive, sub_path, source_path, files, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn DeleteFiles(
            archive: *const ::std::ffi::c_char,
            files: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            $crate::exports::delete_files($wrapper, archive, files)
        }

        #[no_mangle]
        pub unsafe extern "system" fn DeleteFilesW(
            archive: *const u16,
            files: *const u16,
        ) -> ::std::ffi::c_int {
            $crate::exports::delete_files($wrapper, archive, files)
        }

        #[no_mangle]
        pub unsafe extern "system" fn CanYouHandleThisFile(
            file: *const ::std::ffi::c_char,
        ) -> $crate::ffi::Bool {
            $crate::exports::can_you_handle_this_file($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn CanYouHandleThisFileW(file: *const u16) -> $crate::ffi::Bool {
            $crate::exports::can_you_handle_this_file($wrapper, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ConfigurePacker(
            parent: isize,
            _dll_instance: isize,
        ) {
            $crate::exports::configure_packer($wrapper, parent)
        }

        #[no_mangle]
        pub unsafe extern "system" fn StartMemPack(
            options: ::std::ffi::c_int,
            file: *const ::std::ffi::c_char,
        ) -> isize {
            $crate::exports::start_mem_pack($wrapper, options, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn StartMemPackW(
            options: ::std::ffi::c_int,
            file: *const u16,
        ) -> isize {
            $crate::exports::start_mem_pack($wrapper, options, file)
        }

        #[no_mangle]
        pub unsafe extern "system" fn PackToMem(
            handle: isize,
            input: *const u8,
            in_len: ::std::ffi::c_int,
            taken: *mut ::std::ffi::c_int,
            output: *mut u8,
            out_len: ::std::ffi::c_int,
            written: *mut ::std::ffi::c_int,
            seek_by: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::pack_to_mem(
                $wrapper,
                handle,
                input,
                in_len,
                taken,
                output,
                out_len,
                written,
                seek_by,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn DoneMemPack(
            handle: isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::done_mem_pack($wrapper, handle)
        }

        #[no_mangle]
        pub unsafe extern "system" fn GetBackgroundFlags() -> ::std::ffi::c_int {
            $crate::exports::get_background_flags($wrapper)
        }

        #[no_mangle]
        pub unsafe extern "system" fn PackSetDefaultParams(
            params: *const $crate::ffi::RawDefaultParams,
        ) {
            $crate::exports::set_default_params($wrapper, "PackSetDefaultParams", params)
        }
    };
}

/// Viewer (lister) entry points.
#[macro_export]
macro_rules! lister_exports {
    ($wrapper:expr) => {
        #[no_mangle]
        pub unsafe extern "system" fn ListLoad(
            parent: isize,
            file: *const ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
        ) -> isize {
            $crate::exports::list_load($wrapper, parent, file, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListLoadW(
            parent: isize,
            file: *const u16,
            flags: ::std::ffi::c_int,
        ) -> isize {
            $crate::exports::list_load($wrapper, parent, file, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListLoadNext(
            parent: isize,
            window: isize,
            file: *const ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_load_next($wrapper, parent, window, file, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListLoadNextW(
            parent: isize,
            window: isize,
            file: *const u16,
            flags: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_load_next($wrapper, parent, window, file, flags)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListCloseWindow(window: isize) {
            $crate::exports::list_close_window($wrapper, window)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListSearchText(
            window: isize,
            search: *const ::std::ffi::c_char,
            params: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_search_text($wrapper, window, search, params)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListSearchTextW(
            window: isize,
            search: *const u16,
            params: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_search_text($wrapper, window, search, params)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListSendCommand(
            window: isize,
            command: ::std::ffi::c_int,
            parameter: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_send_command($wrapper, window, command, parameter)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListPrint(
            window: isize,
            file: *const ::std::ffi::c_char,
            printer: *const ::std::ffi::c_char,
            flags: ::std::ffi::c_int,
            margins: *const $crate::ffi::Rect,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_print($wrapper, window, file, printer, flags, margins)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListPrintW(
            window: isize,
            file: *const u16,
            printer: *const u16,
            flags: ::std::ffi::c_int,
            margins: *const $crate::ffi::Rect,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_print($wrapper, window, file, printer, flags, margins)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListNotificationReceived(
            window: isize,
            message: ::std::ffi::c_int,
            wparam: isize,
            lparam: isize,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_notification_received($wrapper, window, message, wparam, lparam)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListGetPreviewBitmap(
            file: *const ::std::ffi::c_char,
            width: ::std::ffi::c_int,
            height: ::std::ffi::c_int,
            content: *const u8,
            content_len: ::std::ffi::c_int,
        ) -> isize {
            $crate::exports::list_get_preview_bitmap(
                $wrapper,
                file,
                width,
                height,
                content,
                content_len,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListGetPreviewBitmapW(
            file: *const u16,
            width: ::std::ffi::c_int,
            height: ::std::ffi::c_int,
            content: *const u8,
            content_len: ::std::ffi::c_int,
        ) -> isize {
            $crate::exports::list_get_preview_bitmap(
                $wrapper,
                file,
                width,
                height,
                content,
                content_len,
            )
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListSearchDialog(
            window: isize,
            find_next: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::list_search_dialog($wrapper, window, find_next)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListGetDetectString(
            detect: *mut ::std::ffi::c_char,
            max_len: ::std::ffi::c_int,
        ) {
            $crate::exports::list_get_detect_string($wrapper, detect, max_len)
        }

        #[no_mangle]
        pub unsafe extern "system" fn ListSetDefaultParams(
            params: *const $crate::ffi::RawDefaultParams,
        ) {
            $crate::exports::set_default_params($wrapper, "ListSetDefaultParams", params)
        }
    };
}

/// Quick-search entry points.
#[macro_export]
macro_rules! qs_exports {
    ($wrapper:expr) => {
        #[no_mangle]
        pub unsafe extern "system" fn MatchFileW(
            filter: *const u16,
            file_name: *const u16,
        ) -> $crate::ffi::Bool {
            $crate::exports::match_file($wrapper, filter, file_name)
        }

        #[no_mangle]
        pub unsafe extern "system" fn MatchGetSetOptions(
            status: ::std::ffi::c_int,
        ) -> ::std::ffi::c_int {
            $crate::exports::match_get_set_options($wrapper, status)
        }
    };
}

#[cfg(test)]
mod tests {
    use std::ffi::c_char;

    use isoplug_plugin_sdk::CapabilityKind;

    use super::*;
    use crate::{
        ffi::{FindDataW, OpenArchiveData},
        host::Host,
        testing::{self, callbacks as cb, SAMPLE_CONTENT},
    };

    fn wrapper(dir: &Path, kind: CapabilityKind) -> Wrapper {
        wrapper_with(dir, kind, &[])
    }

    fn wrapper_with(dir: &Path, kind: CapabilityKind, settings: &[(&str, &str)]) -> Wrapper {
        let path = testing::sample_wrapper(dir, kind, settings);
        Wrapper::new(Host::new(testing::registry()), path, kind)
    }

    fn wide(text: &str) -> Vec<u16> {
        ffi::wide_buffer(text, MAX_PATH)
    }

    #[test]
    fn guard_turns_panics_into_fallbacks() {
        let value = guard("Test", |_| -1, || -> Result<i32> { panic!("boom") });
        assert_eq!(value, -1);
        assert_eq!(guard("Test", |_| -1, || Ok(5)), 5);
    }

    #[test]
    fn wide_listing_fills_native_records() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::FileSystem);
        let mut data: FindDataW = unsafe { std::mem::zeroed() };
        let root = wide("/");
        let handle = unsafe { fs_find_first(Ok(&w), root.as_ptr(), &mut data) };
        assert_ne!(handle, INVALID_HANDLE);
        assert_eq!(ffi::from_wide_buffer(&data.file_name), "readme.txt");
        assert_eq!(unsafe { fs_find_next(Ok(&w), handle, &mut data) }, TRUE);
        assert_eq!(data.attributes, FindData::ATTR_DIRECTORY);
        assert_eq!(fs_find_close(Ok(&w), handle), 0);

        let missing = wide("/missing");
        assert_eq!(unsafe { fs_find_first(Ok(&w), missing.as_ptr(), &mut data) }, INVALID_HANDLE);
    }

    #[test]
    fn get_file_writes_back_the_local_name() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::FileSystem);
        let remote = wide("/readme.txt");
        let mut local = wide("/tmp/readme.txt");
        let status = unsafe {
            fs_get_file(
                Ok(&w),
                remote.as_ptr(),
                local.as_mut_ptr(),
                0,
                std::ptr::null(),
            )
        };
        assert_eq!(status, FsStatus::Ok as c_int);
        assert_eq!(ffi::from_wide_buffer(&local), "/tmp/readme.txt.part");

        let mut remote_out = wide("/x");
        let status = unsafe { fs_put_file(Ok(&w), local.as_ptr(), remote_out.as_mut_ptr(), 0) };
        assert_eq!(status, FsStatus::NotSupported as c_int);
    }

    #[test]
    fn content_values_use_native_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::FileSystem);
        let mut name = vec![0 as c_char; 64];
        let mut units = vec![0 as c_char; 64];
        let ty = unsafe {
            content_get_supported_field(
                Ok(&w),
                0,
                name.as_mut_ptr(),
                units.as_mut_ptr(),
                64,
            )
        };
        assert_eq!(ty, FieldType::Numeric32 as c_int);
        assert_eq!(ffi::from_ansi_buffer(&name), "name length");

        let mut value = 0i32;
        let file = wide("abcdef");
        let code = unsafe {
            content_get_value(
                Ok(&w),
                file.as_ptr(),
                0,
                0,
                &mut value as *mut i32 as *mut c_void,
                4,
                0,
            )
        };
        assert_eq!(code, FieldType::Numeric32 as c_int);
        assert_eq!(value, 6);
        let code = unsafe {
            content_get_value(
                Ok(&w),
                file.as_ptr(),
                3,
                0,
                &mut value as *mut i32 as *mut c_void,
                4,
                0,
            )
        };
        assert_eq!(code, ValueResult::NoSuchField.code());
    }

    #[test]
    fn open_archive_reports_status_in_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::Packer);
        let mut name = ffi::ansi_buffer("/tmp/a.zip", MAX_PATH);
        let mut data = OpenArchiveData {
            arc_name: name.as_mut_ptr(),
            open_mode: 0,
            open_result: -1,
            cmt_buf: std::ptr::null_mut(),
            cmt_buf_size: 0,
            cmt_size: 0,
            cmt_state: 0,
        };
        assert_eq!(unsafe { open_archive(Ok(&w), &mut data) }, 0);
        assert_eq!(data.open_result, PackerStatus::UnknownFormat.code());

        let mut name = ffi::ansi_buffer("/tmp/a.smp", MAX_PATH);
        data.arc_name = name.as_mut_ptr();
        let handle = unsafe { open_archive(Ok(&w), &mut data) };
        assert_ne!(handle, 0);
        assert_eq!(data.open_result, 0);
        let mut header: ffi::HeaderData = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { read_header(Ok(&w), handle, &mut header) }, 0);
        assert_eq!(ffi::from_ansi_buffer(&header.file_name), "a.txt");
        assert_eq!(unsafe { read_header(Ok(&w), handle, &mut header) }, 0);
        assert_eq!(
            unsafe { read_header(Ok(&w), handle, &mut header) },
            PackerStatus::EndArchive.code()
        );
        assert_eq!(close_archive(Ok(&w), handle), 0);
    }

    #[test]
    fn icons_and_local_names_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::FileSystem);
        let mut remote = wide("/docs");
        let mut icon = 0isize;
        let code = unsafe { fs_extract_custom_icon(Ok(&w), remote.as_mut_ptr(), 0, &mut icon) };
        assert_eq!(code, CustomIcon::Extracted(0).code());
        assert_eq!(icon, 0x10);
        assert_eq!(ffi::from_wide_buffer(&remote), "/docs/folder.ico");

        let mut remote = wide("/readme.txt");
        let code = unsafe { fs_extract_custom_icon(Ok(&w), remote.as_mut_ptr(), 0, &mut icon) };
        assert_eq!(code, CustomIcon::UseDefault.code());
        assert_eq!(ffi::from_wide_buffer(&remote), "/readme.txt");

        let found = unsafe { fs_get_local_name(Ok(&w), remote.as_mut_ptr(), MAX_PATH as c_int) };
        assert_eq!(found, TRUE);
        assert_eq!(ffi::from_wide_buffer(&remote), "/srv/sample/readme.txt");
        let mut folder = wide("/docs");
        let found = unsafe { fs_get_local_name(Ok(&w), folder.as_mut_ptr(), MAX_PATH as c_int) };
        assert_eq!(found, FALSE);
        assert_eq!(ffi::from_wide_buffer(&folder), "/docs");
        assert_eq!(fs_get_background_flags(Ok(&w)), 3);
    }

    #[test]
    fn compare_progress_round_trips_through_the_native_callback() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper_with(
            dir.path(),
            CapabilityKind::Content,
            &[("plugin_class", SAMPLE_CONTENT)],
        );
        let (first, second, large) = (wide("/a.txt"), wide("/b.txt"), wide("/large.txt"));
        let details = std::ptr::null();
        let progress = Some(cb::content_progress as ContentProgressProc);

        let code = unsafe {
            content_compare_files(
                Ok(&w),
                progress,
                0,
                first.as_ptr(),
                second.as_ptr(),
                details,
            )
        };
        assert_eq!(code, CompareResult::Equal.code());
        let code = unsafe {
            content_compare_files(
                Ok(&w),
                progress,
                0,
                first.as_ptr(),
                large.as_ptr(),
                details,
            )
        };
        assert_eq!(code, CompareResult::Aborted.code());
        let code = unsafe {
            content_compare_files(
                Ok(&w),
                None,
                0,
                first.as_ptr(),
                large.as_ptr(),
                details,
            )
        };
        assert_eq!(code, CompareResult::NotEqual.code());

        let mut detect = vec![0 as c_char; 64];
        unsafe { content_get_detect_string(Ok(&w), detect.as_mut_ptr(), 64) };
        assert_eq!(ffi::from_ansi_buffer(&detect), "EXT=\"SMP\"");
    }

    #[test]
    fn memory_pack_copies_chunks_into_host_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::Packer);
        let file = wide("/tmp/out.smp");
        let with_headers = isoplug_plugin_sdk::packer::mem_pack::WANT_HEADERS;
        assert_eq!(unsafe { start_mem_pack(Ok(&w), with_headers, file.as_ptr()) }, 0);
        let handle = unsafe { start_mem_pack(Ok(&w), 0, file.as_ptr()) };
        assert_ne!(handle, 0);

        let input = b"abc";
        let mut output = [0u8; 2];
        let (mut taken, mut written) = (0, 0);
        let code = unsafe {
            pack_to_mem(
                Ok(&w),
                handle,
                input.as_ptr(),
                input.len() as c_int,
                &mut taken,
                output.as_mut_ptr(),
                output.len() as c_int,
                &mut written,
                0,
            )
        };
        assert_eq!(code, 0);
        assert_eq!((taken, written), (2, 2));
        assert_eq!(&output, b"AB");

        let code = unsafe {
            pack_to_mem(
                Ok(&w),
                handle,
                std::ptr::null(),
                0,
                &mut taken,
                output.as_mut_ptr(),
                output.len() as c_int,
                &mut written,
                0,
            )
        };
        assert_eq!(code, 1);
        assert_eq!((taken, written), (0, 0));
        assert_eq!(done_mem_pack(Ok(&w), handle), PackerStatus::Success.code());
    }

    #[test]
    fn default_params_reach_every_plugin_object() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::FileSystem);
        let mut raw = RawDefaultParams {
            size: std::mem::size_of::<RawDefaultParams>() as c_int,
            version_low: 10,
            version_high: 2,
            ini_name: [0; MAX_PATH],
        };
        ffi::copy_ansi(&mut raw.ini_name, "/etc/host.ini");
        unsafe { set_default_params(Ok(&w), "FsSetDefaultParams", &raw) };
        let stored = w
            .invoke("FsInit", |p| Ok(p.core().default_params().cloned()))
            .unwrap()
            .unwrap();
        assert_eq!(stored.interface_version, (2, 10));
        assert_eq!(stored.ini_name, "/etc/host.ini");

        unsafe { set_default_params(Ok(&w), "FsSetDefaultParams", std::ptr::null()) };
        let kept = w.invoke("FsInit", |p| Ok(p.core().default_params().cloned())).unwrap();
        assert_eq!(kept, Some(stored));
    }

    #[test]
    fn viewer_entry_points_map_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let w = wrapper(dir.path(), CapabilityKind::Lister);
        let file = wide("/tmp/notes.txt");
        let content = b"BMxx";
        let bitmap = unsafe {
            list_get_preview_bitmap(
                Ok(&w),
                file.as_ptr(),
                4,
                8,
                content.as_ptr(),
                content.len() as c_int,
            )
        };
        assert_eq!(bitmap, 32);
        let bitmap = unsafe {
            list_get_preview_bitmap(
                Ok(&w),
                file.as_ptr(),
                4,
                8,
                std::ptr::null(),
                0,
            )
        };
        assert_eq!(bitmap, 0);

        let mut detect = vec![0 as c_char; 64];
        unsafe { list_get_detect_string(Ok(&w), detect.as_mut_ptr(), 64) };
        assert_eq!(ffi::from_ansi_buffer(&detect), "EXT=\"TXT\"");
        assert_eq!(list_search_dialog(Ok(&w), 0x7fff, 1), ListerStatus::Error as c_int);
    }

    fn unavailable<'a>() -> Result<&'a Wrapper> {
        Err(anyhow!("no wrapper"))
    }

    #[test]
    fn missing_wrapper_yields_failure_values() {
        assert_eq!(get_packer_caps(unavailable()), 0);
        assert_eq!(match_get_set_options(unavailable(), 1), 0);
        assert_eq!(fs_init(unavailable(), 1, |_| {}), -1);
        assert_eq!(fs_get_background_flags(unavailable()), 0);
        assert_eq!(fs_links_to_local_files(unavailable()), FALSE);
        assert_eq!(get_background_flags(unavailable()), 0);
        assert_eq!(content_get_default_sort_order(unavailable(), 0), SortOrder::Ascending as c_int);
        assert_eq!(list_search_dialog(unavailable(), 1, 1), ListerStatus::Error as c_int);
        let name = wide("/a.txt");
        let code = unsafe {
            content_compare_files(
                unavailable(),
                None,
                0,
                name.as_ptr(),
                name.as_ptr(),
                std::ptr::null(),
            )
        };
        assert_eq!(code, CompareResult::FileOpenError.code());
        assert_eq!(unsafe { start_mem_pack(unavailable(), 0, name.as_ptr()) }, 0);
    }
}
