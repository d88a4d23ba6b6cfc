//! Host callback pointers and dispatch of relayed plugin events.

use std::ffi::{c_char, c_int};

use isoplug_plugin_sdk::{
    event::{EventKind, PluginEvent},
    password::CryptMode,
};

use crate::ffi::{self, MAX_PATH};

pub type ProgressProc = unsafe extern "system" fn(
    c_int,
    *const c_char,
    *const c_char,
    c_int,
) -> c_int;
pub type ProgressProcW = unsafe extern "system" fn(c_int, *const u16, *const u16, c_int) -> c_int;
pub type LogProc = unsafe extern "system" fn(c_int, c_int, *const c_char);
pub type LogProcW = unsafe extern "system" fn(c_int, c_int, *const u16);
pub type RequestProc =
    unsafe extern "system" fn(
        c_int,
        c_int,
        *const c_char,
        *const c_char,
        *mut c_char,
        c_int,
    ) -> c_int;
pub type RequestProcW =
    unsafe extern "system" fn(c_int, c_int, *const u16, *const u16, *mut u16, c_int) -> c_int;
pub type CryptProc = unsafe extern "system" fn(
    c_int,
    c_int,
    c_int,
    *mut c_char,
    *mut c_char,
    c_int,
) -> c_int;
pub type CryptProcW = unsafe extern "system" fn(
    c_int,
    c_int,
    c_int,
    *mut u16,
    *mut u16,
    c_int,
) -> c_int;
pub type PkCryptProc = unsafe extern "system" fn(
    c_int,
    c_int,
    *mut c_char,
    *mut c_char,
    c_int,
) -> c_int;
pub type PkCryptProcW = unsafe extern "system" fn(c_int, c_int, *mut u16, *mut u16, c_int) -> c_int;
pub type ProcessDataProc = unsafe extern "system" fn(*mut c_char, c_int) -> c_int;
pub type ProcessDataProcW = unsafe extern "system" fn(*mut u16, c_int) -> c_int;
pub type ChangeVolProc = unsafe extern "system" fn(*mut c_char, c_int) -> c_int;
pub type ChangeVolProcW = unsafe extern "system" fn(*mut u16, c_int) -> c_int;
pub type ContentProgressProc = unsafe extern "system" fn(c_int) -> c_int;

/// Units allocated for a password read back from the host store.
const PASSWORD_BUFFER: usize = 1024;

/// One logical callback registered in either its ANSI or its wide form.
#[derive(Debug, Clone, Copy)]
pub enum Variant<A, W> {
    Unset,
    Ansi(A),
    Wide(W),
}

impl<A, W> Default for Variant<A, W> {
    fn default() -> Self {
        Variant::Unset
    }
}

impl<A: Copy, W: Copy> Variant<A, W> {
    /// Stores the first non-null registration; later ones are ignored.
    pub fn register(&mut self, ansi: Option<A>, wide: Option<W>) -> bool {
        if !matches!(self, Variant::Unset) {
            return false;
        }
        *self = match (ansi, wide) {
            (Some(ansi), _) => Variant::Ansi(ansi),
            (None, Some(wide)) => Variant::Wide(wide),
            (None, None) => return false,
        };
        true
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Variant::Unset)
    }
}

/// Native callbacks registered for one plugin instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackTable {
    pub progress: Variant<ProgressProc, ProgressProcW>,
    pub log: Variant<LogProc, LogProcW>,
    pub request: Variant<RequestProc, RequestProcW>,
    pub crypt: Variant<CryptProc, CryptProcW>,
    pub pk_crypt: Variant<PkCryptProc, PkCryptProcW>,
    pub process_data: Variant<ProcessDataProc, ProcessDataProcW>,
    pub change_volume: Variant<ChangeVolProc, ChangeVolProcW>,
    pub content_progress: Option<ContentProgressProc>,
}

impl CallbackTable {
    /// Calls the native callback matching `event` and writes its answer back
    /// into the payload. Events without a registered callback keep result 0.
    pub fn dispatch(&self, event: &mut PluginEvent) -> anyhow::Result<()> {
        // SAFETY: every pointer stored here was registered by the host for
        // this plugin instance and follows the documented signature; all
        // buffers passed in outlive the call and are sized as advertised.
        let result = unsafe {
            match &mut event.kind {
                EventKind::Progress {
                    plugin_number,
                    source,
                    target,
                    percent,
                } => self.progress(*plugin_number, source, target, *percent),
                EventKind::Log {
                    plugin_number,
                    kind,
                    text,
                } => {
                    self.log(*plugin_number, *kind, text);
                    0
                }
                EventKind::Request {
                    plugin_number,
                    request_type,
                    title,
                    text,
                    returned,
                    max_len,
                } => self.request(*plugin_number, *request_type, title, text, returned, *max_len),
                EventKind::Crypt {
                    plugin_number,
                    crypto_number,
                    mode,
                    store,
                    password,
                } => self.crypt(*plugin_number, *crypto_number, *mode, store, password),
                EventKind::ContentProgress { next_block } => match self.content_progress {
                    Some(proc_) => proc_(*next_block),
                    None => 0,
                },
                EventKind::ProcessData { file_name, size } => self.process_data(file_name, *size),
                EventKind::ChangeVolume { archive, mode } => self.change_volume(archive, *mode),
            }
        };
        event.result = result;
        Ok(())
    }

    unsafe fn progress(&self, number: c_int, source: &str, target: &str, percent: c_int) -> c_int {
        match self.progress {
            Variant::Ansi(f) => {
                let (s, t) = (
                    ffi::ansi_buffer(source, source.len() + 1),
                    ffi::ansi_buffer(target, target.len() + 1),
                );
                f(number, s.as_ptr(), t.as_ptr(), percent)
            }
            Variant::Wide(f) => {
                let (s, t) = (wide(source), wide(target));
                f(number, s.as_ptr(), t.as_ptr(), percent)
            }
            Variant::Unset => 0,
        }
    }

    unsafe fn log(&self, number: c_int, kind: c_int, text: &str) {
        match self.log {
            Variant::Ansi(f) => f(number, kind, ffi::ansi_buffer(text, text.len() + 1).as_ptr()),
            Variant::Wide(f) => f(number, kind, wide(text).as_ptr()),
            Variant::Unset => {}
        }
    }

    unsafe fn request(
        &self,
        number: c_int,
        request_type: c_int,
        title: &str,
        text: &str,
        returned: &mut String,
        max_len: usize,
    ) -> c_int {
        let max_len = max_len.max(1);
        match self.request {
            Variant::Ansi(f) => {
                let mut buf = ffi::ansi_buffer(returned, max_len);
                let (title, text) = (
                    ffi::ansi_buffer(title, title.len() + 1),
                    ffi::ansi_buffer(text, text.len() + 1),
                );
                let result = f(
                    number,
                    request_type,
                    title.as_ptr(),
                    text.as_ptr(),
                    buf.as_mut_ptr(),
                    max_len as c_int,
                );
                *returned = ffi::from_ansi_buffer(&buf);
                result
            }
            Variant::Wide(f) => {
                let mut buf = ffi::wide_buffer(returned, max_len);
                let (title, text) = (wide(title), wide(text));
                let result = f(
                    number,
                    request_type,
                    title.as_ptr(),
                    text.as_ptr(),
                    buf.as_mut_ptr(),
                    max_len as c_int,
                );
                *returned = ffi::from_wide_buffer(&buf);
                result
            }
            Variant::Unset => 0,
        }
    }

    /// File-system crypt events carry the plugin number; packer ones carry a
    /// negative number and go to the packer callback.
    unsafe fn crypt(
        &self,
        number: c_int,
        crypto: c_int,
        mode: c_int,
        store: &mut String,
        password: &mut String,
    ) -> c_int {
        let capacity = if CryptMode::loads(mode) {
            PASSWORD_BUFFER
        } else {
            password.encode_utf16().count().max(password.len()) + 1
        };
        let store_capacity = store.len() + 1;
        let loads = CryptMode::loads(mode);

        macro_rules! call {
            ($buffer:path, $read:path, |$s:ident, $p:ident| $invoke:expr) => {{
                let mut store_buf = $buffer(store, store_capacity);
                let mut pass_buf = $buffer(if loads { "" } else { password.as_str() }, capacity);
                let ($s, $p) = (store_buf.as_mut_ptr(), pass_buf.as_mut_ptr());
                let result = $invoke;
                if loads && result == 0 {
                    *password = $read(&pass_buf);
                }
                result
            }};
        }

        if number < 0 {
            match self.pk_crypt {
                Variant::Ansi(f) => call!(
                    ffi::ansi_buffer,
                    ffi::from_ansi_buffer,
                    |s, p| f(crypto, mode, s, p, capacity as c_int)
                ),
                Variant::Wide(f) => call!(
                    ffi::wide_buffer,
                    ffi::from_wide_buffer,
                    |s, p| f(crypto, mode, s, p, capacity as c_int)
                ),
                Variant::Unset => 0,
            }
        } else {
            match self.crypt {
                Variant::Ansi(f) => call!(
                    ffi::ansi_buffer,
                    ffi::from_ansi_buffer,
                    |s, p| f(number, crypto, mode, s, p, capacity as c_int)
                ),
                Variant::Wide(f) => call!(
                    ffi::wide_buffer,
                    ffi::from_wide_buffer,
                    |s, p| f(number, crypto, mode, s, p, capacity as c_int)
                ),
                Variant::Unset => 0,
            }
        }
    }

    unsafe fn process_data(&self, file_name: &str, size: c_int) -> c_int {
        match self.process_data {
            Variant::Ansi(f) => f(
                ffi::ansi_buffer(file_name, file_name.len() + 1).as_mut_ptr(),
                size,
            ),
            Variant::Wide(f) => f(wide(file_name).as_mut_ptr(), size),
            // The host reads 0 as "abort"; without a callback keep going.
            Variant::Unset => 1,
        }
    }

    unsafe fn change_volume(&self, archive: &mut String, mode: c_int) -> c_int {
        match self.change_volume {
            Variant::Ansi(f) => {
                let mut buf = ffi::ansi_buffer(archive, MAX_PATH);
                let result = f(buf.as_mut_ptr(), mode);
                *archive = ffi::from_ansi_buffer(&buf);
                result
            }
            Variant::Wide(f) => {
                let mut buf = ffi::wide_buffer(archive, MAX_PATH);
                let result = f(buf.as_mut_ptr(), mode);
                *archive = ffi::from_wide_buffer(&buf);
                result
            }
            Variant::Unset => 0,
        }
    }
}

fn wide(text: &str) -> Vec<u16> {
    ffi::wide_buffer(text, text.encode_utf16().count() + 1)
}
