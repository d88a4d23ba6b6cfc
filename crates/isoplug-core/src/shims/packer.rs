use anyhow::Result;
use isoplug_plugin_sdk::{
    packer::{HeaderData, MemPackChunk, OpenMode, PackerStatus, ProcessOperation},
    CapabilityKind, NotImplemented, PackerPlugin,
};

use super::{contract_missing, unknown_handle};
use crate::{callbacks::CallbackTable, handles::Handle, wrapper::Wrapper};

/// Archive status to hand back to native code for a failed call.
pub fn status_of(err: &anyhow::Error) -> PackerStatus {
    for cause in err.chain() {
        if let Some(status) = cause.downcast_ref::<PackerStatus>() {
            return *status;
        }
        if cause.downcast_ref::<NotImplemented>().is_some() {
            return PackerStatus::NotSupported;
        }
    }
    PackerStatus::BadData
}

impl Wrapper {
    fn packer<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn PackerPlugin) -> Result<R> + Send + 'static,
    {
        self.invoke(signature, move |plugin| match plugin.as_packer() {
            Some(packer) => f(packer),
            None => Err(contract_missing(CapabilityKind::Packer)),
        })
    }

    /// Opens an archive session and returns its handle.
    pub fn open_archive(&self, archive: &str, mode: OpenMode) -> Result<Handle> {
        let archive = archive.to_string();
        let session = self.packer(
            "OpenArchive",
            move |packer| packer.open_archive(&archive, mode),
        )?;
        Ok(self.host().handles().add(session))
    }

    pub fn read_header(&self, handle: Handle) -> Result<Option<HeaderData>> {
        let session = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        let next = self.packer("ReadHeader", move |packer| packer.read_header(&session))?;
        Ok(next.map(|(session, header)| {
            self.host().handles().update(handle, session);
            header
        }))
    }

    pub fn process_file(
        &self,
        handle: Handle,
        operation: ProcessOperation,
        dest: Option<&str>,
    ) -> Result<PackerStatus> {
        let session = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        let dest = dest.map(str::to_string);
        self.packer("ProcessFile", move |packer| {
            packer.process_file(&session, operation, dest.as_deref())
        })
    }

    pub fn close_archive(&self, handle: Handle) -> Result<PackerStatus> {
        let session = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        self.host().handles().remove(handle);
        self.packer("CloseArchive", move |packer| packer.close_archive(session))
    }

    /// Stores change-volume and process-data callbacks for the plugin.
    pub fn set_packer_callbacks(&self, register: impl FnOnce(&mut CallbackTable)) -> Result<()> {
        let (record, _) = self.plugin("SetProcessDataProc")?;
        record.update_callbacks(register);
        Ok(())
    }

    pub fn pk_set_crypt_callback(
        &self,
        crypto_number: i32,
        flags: i32,
        register: impl FnOnce(&mut CallbackTable),
    ) -> Result<()> {
        self.set_packer_callbacks(register)?;
        self.invoke_all("PkSetCryptCallback", move |plugin| {
            plugin.create_password(crypto_number, flags);
            Ok(())
        })
    }

    pub fn packer_caps(&self) -> Result<i32> {
        self.packer("GetPackerCaps", |packer| Ok(packer.capabilities()))
    }

    pub fn pack_files(
        &self,
        archive: &str,
        sub_path: Option<&str>,
        source_path: &str,
        files: Vec<String>,
        flags: i32,
    ) -> Result<PackerStatus> {
        let (archive, source_path) = (archive.to_string(), source_path.to_string());
        let sub_path = sub_path.map(str::to_string);
        self.packer("PackFiles", move |packer| {
            packer.pack_files(&archive, sub_path.as_deref(), &source_path, &files, flags)
        })
    }

    pub fn delete_files(&self, archive: &str, files: Vec<String>) -> Result<PackerStatus> {
        let archive = archive.to_string();
        self.packer("DeleteFiles", move |packer| packer.delete_files(&archive, &files))
    }

    pub fn can_you_handle_this_file(&self, file: &str) -> Result<bool> {
        let file = file.to_string();
        self.packer("CanYouHandleThisFile", move |packer| {
            packer.can_you_handle_this_file(&file)
        })
    }

    pub fn configure_packer(&self, window: isize) -> Result<()> {
        self.host().set_main_window(window);
        self.packer("ConfigurePacker", move |packer| packer.configure_packer(window))
    }

    /// Starts an in-memory pack stream and returns its handle.
    pub fn start_mem_pack(&self, options: i32, file: &str) -> Result<Handle> {
        let file = file.to_string();
        let stream = self.packer("StartMemPack", move |packer| {
            packer.start_mem_pack(options, &file)
        })?;
        Ok(self.host().handles().add(stream))
    }

    pub fn pack_to_mem(
        &self,
        handle: Handle,
        input: &[u8],
        output_len: usize,
        seek_by: i32,
    ) -> Result<MemPackChunk> {
        let stream = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        let input = input.to_vec();
        let (stream, chunk) = self.packer("PackToMem", move |packer| {
            packer.pack_to_mem(&stream, &input, output_len, seek_by)
        })?;
        self.host().handles().update(handle, stream);
        Ok(chunk)
    }

    pub fn done_mem_pack(&self, handle: Handle) -> Result<PackerStatus> {
        let stream = self
            .host()
            .handles()
            .get(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        self.host().handles().remove(handle);
        self.packer("DoneMemPack", move |packer| packer.done_mem_pack(stream))
    }

    pub fn packer_background_flags(&self) -> Result<i32> {
        self.packer("GetBackgroundFlags", |packer| Ok(packer.background_flags()))
    }
}

#[cfg(test)]
mod tests {
    use isoplug_plugin_sdk::packer as packer_sdk;

    use super::*;
    use crate::{
        host::Host,
        testing::{self, callbacks as cb},
    };

    fn wrapper(dir: &std::path::Path) -> Wrapper {
        let path = testing::sample_wrapper(dir, CapabilityKind::Packer, &[]);
        Wrapper::new(Host::new(testing::registry()), path, CapabilityKind::Packer)
    }

    #[test]
    fn archive_session_lists_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        let handle = packer.open_archive("/tmp/a.smp", OpenMode::Extract).unwrap();
        let mut names = Vec::new();
        while let Some(header) = packer.read_header(handle).unwrap() {
            assert_eq!(header.archive, "/tmp/a.smp");
            names.push(header.file_name);
            let status = packer
                .process_file(handle, ProcessOperation::Extract, Some("/tmp/out"))
                .unwrap();
            assert_eq!(status, PackerStatus::Success);
        }
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(packer.close_archive(handle).unwrap(), PackerStatus::Success);
        assert!(packer.read_header(handle).is_err());
    }

    #[test]
    fn process_data_callback_can_abort() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        packer
            .set_packer_callbacks(|table| {
                table.process_data.register(Some(cb::process_data_stop), None);
            })
            .unwrap();
        let handle = packer.open_archive("/tmp/a.smp", OpenMode::Extract).unwrap();
        packer.read_header(handle).unwrap();
        let status = packer.process_file(
            handle,
            ProcessOperation::Extract,
            Some("/tmp/out"),
        ).unwrap();
        assert_eq!(status, PackerStatus::Aborted);
        assert_eq!(
            packer.process_file(handle, ProcessOperation::Skip, None).unwrap(),
            PackerStatus::Success
        );
    }

    #[test]
    fn failures_map_to_archive_status() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        let err = packer.open_archive("/tmp/a.zip", OpenMode::List).unwrap_err();
        assert_eq!(status_of(&err), PackerStatus::UnknownFormat);
        let err = packer.pack_files("/tmp/a.smp", None, "/tmp", vec!["x".into()], 0).unwrap_err();
        assert_eq!(status_of(&err), PackerStatus::NotSupported);
        assert_eq!(status_of(&anyhow::anyhow!("boom")), PackerStatus::BadData);
        assert!(packer.can_you_handle_this_file("x.smp").unwrap());
        assert_eq!(packer.packer_caps().unwrap(), 4);
    }

    #[test]
    fn packer_crypt_parameters_survive_in_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        packer
            .pk_set_crypt_callback(3, 1, |table| {
                table.pk_crypt.register(None, Some(cb::pk_crypt_w));
            })
            .unwrap();
        let (record, _) = packer.plugin("test").unwrap();
        assert_eq!(record.crypto().map(|c| c.number), Some(3));
        assert!(record.callbacks().pk_crypt.is_set());
    }

    #[test]
    fn memory_pack_stream_walks_the_handle_table() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        let handle = packer.start_mem_pack(0, "notes.txt").unwrap();
        let chunk = packer.pack_to_mem(handle, b"abcdef", 4, 0).unwrap();
        assert_eq!(chunk.output, b"ABCD");
        assert_eq!(chunk.taken, 4);
        assert!(!chunk.done);
        let chunk = packer.pack_to_mem(handle, b"", 4, 0).unwrap();
        assert!(chunk.done);
        assert_eq!(packer.done_mem_pack(handle).unwrap(), PackerStatus::Success);
        assert!(packer.pack_to_mem(handle, b"x", 4, 0).is_err());

        let err = packer.start_mem_pack(packer_sdk::mem_pack::WANT_HEADERS, "x").unwrap_err();
        assert_eq!(status_of(&err), PackerStatus::NotSupported);
    }

    #[test]
    fn configuration_and_background_flags() {
        let dir = tempfile::tempdir().unwrap();
        let packer = wrapper(dir.path());
        packer.configure_packer(0x77).unwrap();
        assert_eq!(packer.host().main_window(), 0x77);
        assert_eq!(packer.packer_background_flags().unwrap(), packer_sdk::background::UNPACK);
    }
}
