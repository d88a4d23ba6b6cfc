use crate::{
    error::{mandatory, optional},
    Cursor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ListerStatus {
    Ok = 0,
    Error = 1,
}

/// Print margins in millimeters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Commands sent through `send_command`.
pub mod command {
    pub const COPY: i32 = 1;
    pub const NEW_PARAMS: i32 = 2;
    pub const SELECT_ALL: i32 = 3;
    pub const SET_PERCENT: i32 = 4;
}

/// Viewer (lister) capability contract. The returned cursor stands for the
/// viewer window the plugin created.
pub trait ListerPlugin {
    fn load(&mut self, _parent: isize, _file: &str, _flags: i32) -> anyhow::Result<Option<Cursor>> {
        mandatory("load")
    }

    fn load_next(
        &mut self,
        _window: &Cursor,
        _parent: isize,
        _file: &str,
        _flags: i32,
    ) -> anyhow::Result<ListerStatus> {
        optional("load_next")
    }

    /// Dropping the cursor is enough for most viewers.
    fn close_window(&mut self, _window: Cursor) -> anyhow::Result<()> {
        Ok(())
    }

    fn search_text(
        &mut self,
        _window: &Cursor,
        _text: &str,
        _params: i32,
    ) -> anyhow::Result<ListerStatus> {
        optional("search_text")
    }

    /// See [`command`] for the codes.
    fn send_command(
        &mut self,
        _window: &Cursor,
        _command: i32,
        _parameter: i32,
    ) -> anyhow::Result<ListerStatus> {
        optional("send_command")
    }

    fn print(
        &mut self,
        _window: &Cursor,
        _file: &str,
        _printer: &str,
        _flags: i32,
        _margins: Margins,
    ) -> anyhow::Result<ListerStatus> {
        optional("print")
    }

    /// Window message forwarded from the viewer's parent.
    fn notification_received(
        &mut self,
        _window: &Cursor,
        _message: i32,
        _wparam: isize,
        _lparam: isize,
    ) -> anyhow::Result<i32> {
        optional("notification_received")
    }

    /// Native bitmap handle of a thumbnail. `content` holds the start of
    /// the file as read by the host.
    fn get_preview_bitmap(
        &mut self,
        _file: &str,
        _width: i32,
        _height: i32,
        _content: &[u8],
    ) -> anyhow::Result<Option<isize>> {
        optional("get_preview_bitmap")
    }

    /// Shows the plugin's own search dialog.
    fn search_dialog(
        &mut self,
        _window: &Cursor,
        _find_next: bool,
    ) -> anyhow::Result<ListerStatus> {
        optional("search_dialog")
    }

    /// Detect string the host matches before loading the plugin.
    fn detect_string(&self) -> Option<String> {
        None
    }
}
