use anyhow::Result;
use isoplug_plugin_sdk::{
    lister::{ListerStatus, Margins},
    CapabilityKind, Cursor, ListerPlugin,
};

use super::{contract_missing, unknown_handle};
use crate::{handles::Handle, wrapper::Wrapper};

impl Wrapper {
    fn lister<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn ListerPlugin) -> Result<R> + Send + 'static,
    {
        self.invoke(signature, move |plugin| match plugin.as_lister() {
            Some(lister) => f(lister),
            None => Err(contract_missing(CapabilityKind::Lister)),
        })
    }

    /// Registers the viewer window the plugin created. A window that is a
    /// native handle keeps its value; anything else gets a table handle.
    fn register_window(&self, window: Cursor) -> Handle {
        if let Some(&native) = window.downcast_ref::<isize>() {
            if native != 0 && self.host().handles().add_at(native, window.clone()) {
                return native;
            }
        }
        self.host().handles().add(window)
    }

    /// Returns the window handle, or `None` if the plugin declined the file.
    pub fn list_load(&self, parent: isize, file: &str, flags: i32) -> Result<Option<Handle>> {
        let file = file.to_string();
        let window = self.lister("ListLoad", move |lister| lister.load(parent, &file, flags))?;
        Ok(window.map(|window| self.register_window(window)))
    }

    pub fn list_load_next(
        &self,
        window: Handle,
        parent: isize,
        file: &str,
        flags: i32,
    ) -> Result<ListerStatus> {
        let cursor = self.window(window)?;
        let file = file.to_string();
        self.lister("ListLoadNext", move |lister| {
            lister.load_next(&cursor, parent, &file, flags)
        })
    }

    pub fn list_close_window(&self, window: Handle) -> Result<()> {
        let cursor = self.window(window)?;
        self.host().handles().remove(window);
        self.lister("ListCloseWindow", move |lister| lister.close_window(cursor))
    }

    pub fn list_search_text(
        &self,
        window: Handle,
        text: &str,
        params: i32,
    ) -> Result<ListerStatus> {
        let cursor = self.window(window)?;
        let text = text.to_string();
        self.lister("ListSearchText", move |lister| {
            lister.search_text(&cursor, &text, params)
        })
    }

    pub fn list_send_command(
        &self,
        window: Handle,
        command: i32,
        parameter: i32,
    ) -> Result<ListerStatus> {
        let cursor = self.window(window)?;
        self.lister("ListSendCommand", move |lister| {
            lister.send_command(&cursor, command, parameter)
        })
    }

    pub fn list_print(
        &self,
        window: Handle,
        file: &str,
        printer: &str,
        flags: i32,
        margins: Margins,
    ) -> Result<ListerStatus> {
        let cursor = self.window(window)?;
        let (file, printer) = (file.to_string(), printer.to_string());
        self.lister("ListPrint", move |lister| {
            lister.print(&cursor, &file, &printer, flags, margins)
        })
    }

    pub fn list_notification_received(
        &self,
        window: Handle,
        message: i32,
        wparam: isize,
        lparam: isize,
    ) -> Result<i32> {
        let cursor = self.window(window)?;
        self.lister("ListNotificationReceived", move |lister| {
            lister.notification_received(&cursor, message, wparam, lparam)
        })
    }

    pub fn list_get_preview_bitmap(
        &self,
        file: &str,
        width: i32,
        height: i32,
        content: &[u8],
    ) -> Result<Option<isize>> {
        let (file, content) = (file.to_string(), content.to_vec());
        self.lister("ListGetPreviewBitmap", move |lister| {
            lister.get_preview_bitmap(&file, width, height, &content)
        })
    }

    pub fn list_search_dialog(&self, window: Handle, find_next: bool) -> Result<ListerStatus> {
        let cursor = self.window(window)?;
        self.lister("ListSearchDialog", move |lister| {
            lister.search_dialog(&cursor, find_next)
        })
    }

    pub fn list_detect_string(&self) -> Result<Option<String>> {
        self.lister("ListGetDetectString", |lister| Ok(lister.detect_string()))
    }

    fn window(&self, window: Handle) -> Result<Cursor> {
        self.host()
            .handles()
            .get(window)
            .ok_or_else(|| unknown_handle(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::Host,
        lifetime::{classify, FaultClass},
        testing,
    };

    #[test]
    fn viewer_window_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = testing::sample_wrapper(
            dir.path(),
            CapabilityKind::Lister,
            &[("gui_type", "text")],
        );
        let lister = Wrapper::new(Host::new(testing::registry()), path, CapabilityKind::Lister);

        assert!(lister.list_load(7, "/tmp/a.bin", 0).unwrap().is_none());
        let window = lister.list_load(7, "/tmp/notes.txt", 0).unwrap().unwrap();
        assert_eq!(lister.list_search_text(window, "notes", 0).unwrap(), ListerStatus::Ok);
        assert_eq!(lister.list_search_text(window, "zzz", 0).unwrap(), ListerStatus::Error);

        let err = lister.list_load_next(window, 7, "/tmp/b.txt", 0).unwrap_err();
        assert_eq!(classify(&err), FaultClass::NotImplementedOptional);

        lister.list_close_window(window).unwrap();
        assert!(lister.list_search_text(window, "notes", 0).is_err());

        let gui = lister
            .invoke("ListLoad", |p| Ok(p.core().settings().get("gui_type").map(str::to_string)))
            .unwrap();
        assert_eq!(gui.as_deref(), Some("text"));
    }

    #[test]
    fn viewer_commands_go_to_the_open_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = testing::sample_wrapper(dir.path(), CapabilityKind::Lister, &[]);
        let lister = Wrapper::new(Host::new(testing::registry()), path, CapabilityKind::Lister);
        let window = lister.list_load(7, "/tmp/notes.txt", 0).unwrap().unwrap();

        let select_all = isoplug_plugin_sdk::lister::command::SELECT_ALL;
        assert_eq!(lister.list_send_command(window, select_all, 0).unwrap(), ListerStatus::Ok);
        assert_eq!(lister.list_send_command(window, 1, 0).unwrap(), ListerStatus::Error);
        let margins = Margins {
            left: 10,
            top: 10,
            right: 10,
            bottom: 10,
        };
        assert_eq!(
            lister.list_print(window, "/tmp/notes.txt", "lp0", 0, margins).unwrap(),
            ListerStatus::Ok
        );
        assert_eq!(lister.list_notification_received(window, 0x111, 0, 0).unwrap(), 0x112);
        assert_eq!(lister.list_search_dialog(window, true).unwrap(), ListerStatus::Ok);
        assert_eq!(lister.list_detect_string().unwrap().as_deref(), Some("EXT=\"TXT\""));

        assert_eq!(lister.list_get_preview_bitmap("/tmp/a.bmp", 4, 8, b"BM..").unwrap(), Some(32));
        assert!(lister.list_get_preview_bitmap("/tmp/a.txt", 4, 8, b"text").unwrap().is_none());

        lister.list_close_window(window).unwrap();
        assert!(lister.list_send_command(window, select_all, 0).is_err());
    }
}
