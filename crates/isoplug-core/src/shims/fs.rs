use anyhow::Result;
use isoplug_plugin_sdk::{
    fs::{
        CopyFlags, CustomIcon, ExecStatus, FileTimes, FindData, FsStatus, Preview, RemoteInfo,
        StatusPhase,
    },
    CapabilityKind, DefaultParams, FsPlugin,
};

use super::{contract_missing, unknown_handle};
use crate::{callbacks::CallbackTable, handles::Handle, wrapper::Wrapper};

impl Wrapper {
    fn fs<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn FsPlugin) -> Result<R> + Send + 'static,
    {
        self.invoke(signature, move |plugin| match plugin.as_fs() {
            Some(fs) => f(fs),
            None => Err(contract_missing(CapabilityKind::FileSystem)),
        })
    }

    /// Registers the host callbacks and assigns the plugin number.
    pub fn fs_init(
        &self,
        plugin_number: i32,
        register: impl FnOnce(&mut CallbackTable),
    ) -> Result<()> {
        let (record, _) = self.plugin("FsInit")?;
        record.update_callbacks(register);
        self.invoke_all("FsInit", move |plugin| {
            plugin.core_mut().set_plugin_number(plugin_number);
            Ok(())
        })
    }

    pub fn fs_set_crypt_callback(
        &self,
        crypto_number: i32,
        flags: i32,
        register: impl FnOnce(&mut CallbackTable),
    ) -> Result<()> {
        let (record, _) = self.plugin("FsSetCryptCallback")?;
        record.update_callbacks(register);
        self.invoke_all("FsSetCryptCallback", move |plugin| {
            plugin.create_password(crypto_number, flags);
            Ok(())
        })
    }

    /// Starts a listing; the cursor stays in the handle table until
    /// [`Wrapper::fs_find_close`].
    pub fn fs_find_first(&self, path: &str) -> Result<Option<(Handle, FindData)>> {
        let path = path.to_string();
        let found = self.fs("FsFindFirst", move |fs| fs.find_first(&path))?;
        Ok(found.map(|(cursor, data)| (self.host().handles().add(cursor), data)))
    }

    pub fn fs_find_next(&self, handle: Handle) -> Result<Option<FindData>> {
        let cursor = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        let found = self.fs("FsFindNext", move |fs| fs.find_next(&cursor))?;
        Ok(found.map(|(cursor, data)| {
            self.host().handles().update(handle, cursor);
            data
        }))
    }

    pub fn fs_find_close(&self, handle: Handle) -> Result<()> {
        let cursor = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        self.host().handles().remove(handle);
        self.fs("FsFindClose", move |fs| fs.find_close(cursor))
    }

    /// Returns the status and the local name, which the plugin may change.
    pub fn fs_get_file(
        &self,
        remote: &str,
        local: &str,
        flags: CopyFlags,
        info: RemoteInfo,
    ) -> Result<(FsStatus, String)> {
        let (remote, mut local) = (remote.to_string(), local.to_string());
        self.fs("FsGetFile", move |fs| {
            let status = fs.get_file(&remote, &mut local, flags, &info)?;
            Ok((status, local))
        })
    }

    pub fn fs_put_file(
        &self,
        local: &str,
        remote: &str,
        flags: CopyFlags,
    ) -> Result<(FsStatus, String)> {
        let (local, mut remote) = (local.to_string(), remote.to_string());
        self.fs("FsPutFile", move |fs| {
            let status = fs.put_file(&local, &mut remote, flags)?;
            Ok((status, remote))
        })
    }

    pub fn fs_ren_mov_file(
        &self,
        old: &str,
        new: &str,
        move_file: bool,
        overwrite: bool,
        info: RemoteInfo,
    ) -> Result<FsStatus> {
        let (old, new) = (old.to_string(), new.to_string());
        self.fs("FsRenMovFile", move |fs| {
            fs.ren_mov_file(&old, &new, move_file, overwrite, &info)
        })
    }

    pub fn fs_delete_file(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.fs("FsDeleteFile", move |fs| fs.delete_file(&name))
    }

    pub fn fs_remove_dir(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.fs("FsRemoveDir", move |fs| fs.remove_dir(&name))
    }

    pub fn fs_mk_dir(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.fs("FsMkDir", move |fs| fs.mk_dir(&name))
    }

    /// Dispatches on `verb`: `open`, `properties`, anything else is a command.
    pub fn fs_execute_file(
        &self,
        window: isize,
        remote: &str,
        verb: &str,
    ) -> Result<(ExecStatus, String)> {
        self.host().set_main_window(window);
        let (mut remote, verb) = (remote.to_string(), verb.to_string());
        self.fs("FsExecuteFile", move |fs| {
            let status = match verb.as_str() {
                "open" => fs.execute_open(window, &mut remote)?,
                "properties" => fs.execute_properties(window, &remote)?,
                command => fs.execute_command(window, &mut remote, command)?,
            };
            Ok((status, remote))
        })
    }

    pub fn fs_disconnect(&self, root: &str) -> Result<bool> {
        let root = root.to_string();
        self.fs("FsDisconnect", move |fs| fs.disconnect(&root))
    }

    pub fn fs_set_attr(&self, remote: &str, attributes: u32) -> Result<bool> {
        let remote = remote.to_string();
        self.fs("FsSetAttr", move |fs| fs.set_attr(&remote, attributes))
    }

    pub fn fs_set_time(&self, remote: &str, times: FileTimes) -> Result<bool> {
        let remote = remote.to_string();
        self.fs("FsSetTime", move |fs| fs.set_time(&remote, times))
    }

    /// Logs the notification when `write_status_info` is set, then passes
    /// it on.
    pub fn fs_status_info(
        &self,
        remote_dir: &str,
        phase: StatusPhase,
        operation: i32,
    ) -> Result<()> {
        let (record, _) = self.plugin("FsStatusInfo")?;
        if record.flag("write_status_info") {
            tracing::info!(
                plugin = %record.title(),
                dir = remote_dir,
                ?phase,
                operation,
                "status info"
            );
        }
        let remote_dir = remote_dir.to_string();
        self.fs("FsStatusInfo", move |fs| fs.status_info(&remote_dir, phase, operation))
    }

    /// Returns the icon and the remote name, which the plugin may change.
    pub fn fs_extract_custom_icon(&self, remote: &str, flags: i32) -> Result<(CustomIcon, String)> {
        let mut remote = remote.to_string();
        self.fs("FsExtractCustomIcon", move |fs| {
            let icon = fs.extract_custom_icon(&mut remote, flags)?;
            Ok((icon, remote))
        })
    }

    pub fn fs_get_preview_bitmap(
        &self,
        remote: &str,
        width: i32,
        height: i32,
    ) -> Result<(Preview, String)> {
        let mut remote = remote.to_string();
        self.fs("FsGetPreviewBitmap", move |fs| {
            let preview = fs.get_preview_bitmap(&mut remote, width, height)?;
            Ok((preview, remote))
        })
    }

    pub fn fs_get_local_name(&self, remote: &str) -> Result<Option<String>> {
        let remote = remote.to_string();
        self.fs("FsGetLocalName", move |fs| fs.get_local_name(&remote))
    }

    pub fn fs_background_flags(&self) -> Result<i32> {
        self.fs("FsGetBackgroundFlags", |fs| Ok(fs.background_flags()))
    }

    pub fn fs_links_to_local_files(&self) -> Result<bool> {
        self.fs("FsLinksToLocalFiles", |fs| Ok(fs.links_to_local_files()))
    }

    /// Hands the host parameters to every object of the plugin.
    pub fn set_default_params(&self, signature: &'static str, params: DefaultParams) -> Result<()> {
        self.invoke_all(signature, move |plugin| {
            plugin.core_mut().set_default_params(params.clone());
            Ok(())
        })
    }

    /// Root name shown by the host, falling back to the plugin title.
    pub fn fs_def_root_name(&self) -> Result<String> {
        self.invoke("FsGetDefRootName", |plugin| {
            let title = plugin.core().title().to_string();
            Ok(plugin.as_fs().and_then(|fs| fs.root_name()).unwrap_or(title))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        host::Host,
        lifetime::{classify, FaultClass},
        testing::{self, callbacks as cb, RecordingNotifier},
    };

    fn wrapper(
        dir: &std::path::Path,
        settings: &[(&str, &str)],
    ) -> (Wrapper, Arc<RecordingNotifier>) {
        let path = testing::sample_wrapper(dir, CapabilityKind::FileSystem, settings);
        let notifier = Arc::new(RecordingNotifier::default());
        let host = Host::builder(testing::registry()).notifier(notifier.clone()).build();
        (Wrapper::new(host, path, CapabilityKind::FileSystem), notifier)
    }

    #[test]
    fn listing_walks_the_handle_table() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        let (handle, first) = wrapper.fs_find_first("/").unwrap().unwrap();
        let mut names = vec![first.name];
        while let Some(next) = wrapper.fs_find_next(handle).unwrap() {
            names.push(next.name);
        }
        assert_eq!(names, ["readme.txt", "docs", "data.bin"]);
        assert_eq!(wrapper.host().handles().ref_count(handle), Some(3));
        wrapper.fs_find_close(handle).unwrap();
        assert!(wrapper.host().handles().get(handle).is_none());
        assert!(wrapper.fs_find_next(handle).is_err());
        assert!(wrapper.fs_find_first("/empty").unwrap().is_none());
    }

    #[test]
    fn init_assigns_number_and_registers_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        wrapper
            .fs_init(5, |table| {
                table.progress.register(Some(cb::progress_a), None);
            })
            .unwrap();
        let record = wrapper.host().find_by_number(5).unwrap();
        assert!(record.callbacks().progress.is_set());

        // progress answers 100 (non-zero), which the sample reads as abort
        let (status, local) = wrapper
            .fs_get_file(
                "/readme.txt",
                "/tmp/readme.txt",
                CopyFlags::default(),
                RemoteInfo::default(),
            )
            .unwrap();
        assert_eq!(status, FsStatus::UserAbort);
        assert_eq!(local, "/tmp/readme.txt");
    }

    #[test]
    fn get_file_without_progress_callback_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        let (status, local) = wrapper
            .fs_get_file(
                "/readme.txt",
                "/tmp/readme.txt",
                CopyFlags(CopyFlags::OVERWRITE),
                RemoteInfo::default(),
            )
            .unwrap();
        assert_eq!(status, FsStatus::Ok);
        assert_eq!(local, "/tmp/readme.txt.part");
    }

    #[test]
    fn crypt_parameters_land_in_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        wrapper
            .fs_set_crypt_callback(11, 1, |table| {
                table.crypt.register(Some(cb::crypt_a), None);
            })
            .unwrap();
        let (record, _) = wrapper.plugin("test").unwrap();
        assert_eq!(record.crypto().map(|c| (c.number, c.flags)), Some((11, 1)));
    }

    #[test]
    fn optional_operations_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, notifier) = wrapper(dir.path(), &[]);
        let err = wrapper.fs_mk_dir("/new").unwrap_err();
        assert_eq!(classify(&err), FaultClass::NotImplementedOptional);
        assert!(wrapper.fs_delete_file("/docs").unwrap());
        let err = wrapper.fs_delete_file("/locked").unwrap_err();
        assert_eq!(classify(&err), FaultClass::Ordinary);
        assert_eq!(notifier.errors(), vec!["FsDeleteFile".to_string()]);
    }

    #[test]
    fn execute_remembers_the_main_window() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        assert!(wrapper.fs_execute_file(0x42, "/readme.txt", "open").is_err());
        assert_eq!(wrapper.host().main_window(), 0x42);
        assert_eq!(wrapper.fs_def_root_name().unwrap(), "Sample Root");
    }

    #[test]
    fn attribute_and_time_changes_reach_the_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        assert!(wrapper.fs_set_attr("/readme.txt", 0x01).unwrap());
        assert!(!wrapper.fs_set_attr("/absent", 0x01).unwrap());
        let times = FileTimes {
            modified: Some(std::time::UNIX_EPOCH),
            ..FileTimes::default()
        };
        assert!(wrapper.fs_set_time("/readme.txt", times).unwrap());
        assert!(!wrapper.fs_set_time("/readme.txt", FileTimes::default()).unwrap());
    }

    #[test]
    fn icons_and_local_names_may_rename_the_remote() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, _) = wrapper(dir.path(), &[]);
        let (icon, remote) = wrapper.fs_extract_custom_icon("/docs", 0).unwrap();
        assert_eq!(icon, CustomIcon::Extracted(0x10));
        assert_eq!(remote, "/docs/folder.ico");
        let (icon, remote) = wrapper.fs_extract_custom_icon("/readme.txt", 0).unwrap();
        assert_eq!(icon, CustomIcon::UseDefault);
        assert_eq!(remote, "/readme.txt");

        assert_eq!(
            wrapper.fs_get_local_name("/readme.txt").unwrap().as_deref(),
            Some("/srv/sample/readme.txt")
        );
        assert!(wrapper.fs_get_local_name("/docs").unwrap().is_none());

        let err = wrapper.fs_get_preview_bitmap("/readme.txt", 32, 32).unwrap_err();
        assert_eq!(classify(&err), FaultClass::NotImplementedOptional);
    }

    #[test]
    fn status_info_and_default_params_are_host_local() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, notifier) = wrapper(dir.path(), &[("write_status_info", "true")]);
        let (_, logs) = testing::capture_logs(|| {
            wrapper.fs_status_info("/docs", StatusPhase::Start, 1).unwrap();
            wrapper.fs_status_info("/docs", StatusPhase::End, 1).unwrap();
        });
        assert_eq!(logs.matches("status info").count(), 2);
        assert!(logs.contains("phase=End"));
        assert!(notifier.errors().is_empty());

        let quiet = tempfile::tempdir().unwrap();
        let (silent, _) = self::wrapper(quiet.path(), &[]);
        let (_, logs) = testing::capture_logs(|| {
            silent.fs_status_info("/docs", StatusPhase::Start, 1).unwrap()
        });
        assert!(!logs.contains("status info"));

        let params = DefaultParams {
            interface_version: (2, 0),
            ini_name: "/cfg/plugins.ini".into(),
        };
        wrapper.set_default_params("FsSetDefaultParams", params.clone()).unwrap();
        let stored = wrapper
            .invoke("test", |p| Ok(p.core().default_params().cloned()))
            .unwrap();
        assert_eq!(stored, Some(params));
        assert_eq!(wrapper.fs_background_flags().unwrap(), 3);
        assert!(!wrapper.fs_links_to_local_files().unwrap());
    }
}
