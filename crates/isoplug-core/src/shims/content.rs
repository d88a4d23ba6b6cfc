use anyhow::Result;
use isoplug_plugin_sdk::{
    content::{CompareResult, DefaultView, FieldInfo, FieldValue, SortOrder, ValueResult},
    fs::RemoteInfo,
    CapabilityKind, ContentPlugin,
};

use super::contract_missing;
use crate::{callbacks::ContentProgressProc, wrapper::Wrapper};

impl Wrapper {
    fn content<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn ContentPlugin) -> Result<R> + Send + 'static,
    {
        self.invoke_content(signature, move |plugin| match plugin.as_content() {
            Some(content) => f(content),
            None => Err(contract_missing(CapabilityKind::Content)),
        })
    }

    pub fn content_get_supported_field(&self, index: i32) -> Result<Option<FieldInfo>> {
        self.content("ContentGetSupportedField", move |content| {
            content.get_supported_field(index)
        })
    }

    pub fn content_get_value(
        &self,
        file: &str,
        field: i32,
        unit: i32,
        flags: i32,
    ) -> Result<ValueResult> {
        let file = file.to_string();
        self.content("ContentGetValue", move |content| {
            content.get_value(&file, field, unit, flags)
        })
    }

    pub fn content_stop_get_value(&self, file: &str) -> Result<()> {
        let file = file.to_string();
        self.content("ContentStopGetValue", move |content| content.stop_get_value(&file))
    }

    pub fn content_plugin_unloading(&self) -> Result<()> {
        self.content("ContentPluginUnloading", |content| content.plugin_unloading())
    }

    /// `value` is `None` for the end-of-batch call the host makes after a
    /// series of updates.
    pub fn content_set_value(
        &self,
        file: &str,
        field: i32,
        unit: i32,
        value: Option<FieldValue>,
        flags: i32,
    ) -> Result<bool> {
        let file = file.to_string();
        self.content("ContentSetValue", move |content| {
            content.set_value(&file, field, unit, value, flags)
        })
    }

    pub fn content_get_default_sort_order(&self, field: i32) -> Result<SortOrder> {
        self.content("ContentGetDefaultSortOrder", move |content| {
            content.get_default_sort_order(field)
        })
    }

    pub fn content_get_supported_field_flags(&self, field: i32) -> Result<i32> {
        self.content("ContentGetSupportedFieldFlags", move |content| {
            content.get_supported_field_flags(field)
        })
    }

    pub fn content_get_default_view(&self, max_len: usize) -> Result<Option<DefaultView>> {
        self.content("ContentGetDefaultView", move |content| {
            content.get_default_view(max_len)
        })
    }

    /// Returns the set-value code and the edited value.
    pub fn content_edit_value(
        &self,
        window: isize,
        field: i32,
        unit: i32,
        value: Option<FieldValue>,
        flags: i32,
        language: &str,
    ) -> Result<(i32, Option<FieldValue>)> {
        let language = language.to_string();
        self.content("ContentEditValue", move |content| {
            let mut value = value;
            let code = content.edit_value(window, field, unit, &mut value, flags, &language)?;
            Ok((code, value))
        })
    }

    pub fn content_send_state_information(&self, state: i32, path: &str) -> Result<()> {
        let path = path.to_string();
        self.content("ContentSendStateInformation", move |content| {
            content.send_state_information(state, &path)
        })
    }

    /// Compares two files with `progress` registered for the duration of the
    /// call only.
    pub fn content_compare_files(
        &self,
        progress: Option<ContentProgressProc>,
        index: i32,
        first: &str,
        second: &str,
        details: [RemoteInfo; 2],
    ) -> Result<CompareResult> {
        let (record, _) = self.plugin("ContentCompareFiles")?;
        record.update_callbacks(|table| table.content_progress = progress);
        let (first, second) = (first.to_string(), second.to_string());
        let result = self.content("ContentCompareFiles", move |content| {
            content.compare_files(index, &first, &second, &details)
        });
        record.update_callbacks(|table| table.content_progress = None);
        result
    }

    pub fn content_detect_string(&self) -> Result<Option<String>> {
        self.content("ContentGetDetectString", |content| Ok(content.detect_string()))
    }
}

#[cfg(test)]
mod tests {
    use isoplug_plugin_sdk::content::{FieldType, SET_CANCEL, SET_SUCCESS};

    use super::*;
    use crate::{
        host::Host,
        lifetime::{classify, FaultClass},
        testing::{self, callbacks as cb, SAMPLE_CONTENT},
    };

    fn wrapper(kind: CapabilityKind, dir: &std::path::Path, settings: &[(&str, &str)]) -> Wrapper {
        let path = testing::sample_wrapper(dir, kind, settings);
        Wrapper::new(Host::new(testing::registry()), path, kind)
    }

    #[test]
    fn embedded_fields_come_from_the_shared_object() {
        let dir = tempfile::tempdir().unwrap();
        let fs = wrapper(CapabilityKind::FileSystem, dir.path(), &[]);
        let field = fs.content_get_supported_field(0).unwrap().unwrap();
        assert_eq!(field.field_type, FieldType::Numeric32);
        assert!(fs.content_get_supported_field(1).unwrap().is_none());
        assert_eq!(
            fs.content_get_value("abcd", 0, 0, 0).unwrap(),
            ValueResult::Value(FieldValue::Int32(4))
        );
    }

    #[test]
    fn content_wrapper_uses_the_first_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let content = wrapper(
            CapabilityKind::Content,
            dir.path(),
            &[("plugin_class", SAMPLE_CONTENT)],
        );
        let field = content.content_get_supported_field(1).unwrap().unwrap();
        assert_eq!(field.units, "bytes|kbytes");
        assert_eq!(
            content.content_get_value("x", 1, 1, 0).unwrap(),
            ValueResult::Value(FieldValue::Int64(2))
        );
        assert_eq!(content.content_get_value("x", 9, 0, 0).unwrap().code(), -1);
        assert!(content
            .content_set_value("x", 0, 0, Some(FieldValue::Text("new".into())), 0)
            .unwrap());
        let err = content.content_stop_get_value("x").unwrap_err();
        assert_eq!(classify(&err), FaultClass::NotImplementedOptional);
    }

    #[test]
    fn optional_content_operations_reach_the_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let content = wrapper(
            CapabilityKind::Content,
            dir.path(),
            &[("plugin_class", SAMPLE_CONTENT)],
        );
        assert_eq!(content.content_get_default_sort_order(1).unwrap(), SortOrder::Descending);
        assert_eq!(content.content_get_default_sort_order(0).unwrap(), SortOrder::Ascending);
        assert_eq!(content.content_get_supported_field_flags(-1).unwrap(), 1);
        assert_eq!(content.content_detect_string().unwrap().as_deref(), Some("EXT=\"SMP\""));
        content.content_send_state_information(2, "/tmp").unwrap();

        let (code, value) = content
            .content_edit_value(0, 0, 0, Some(FieldValue::Text("old".into())), 0, "en")
            .unwrap();
        assert_eq!(code, SET_SUCCESS);
        assert_eq!(value, Some(FieldValue::Text("OLD".into())));
        let (code, value) = content.content_edit_value(0, 1, 0, None, 0, "en").unwrap();
        assert_eq!(code, SET_CANCEL);
        assert!(value.is_none());

        let err = content.content_get_default_view(256).unwrap_err();
        assert_eq!(classify(&err), FaultClass::NotImplementedOptional);
    }

    #[test]
    fn compare_progress_reaches_the_native_callback() {
        let dir = tempfile::tempdir().unwrap();
        let content = wrapper(
            CapabilityKind::Content,
            dir.path(),
            &[("plugin_class", SAMPLE_CONTENT)],
        );
        let details = [RemoteInfo::default(), RemoteInfo::default()];

        let result = content
            .content_compare_files(
                Some(cb::content_progress),
                0,
                "/a.txt",
                "/b.txt",
                details.clone(),
            )
            .unwrap();
        assert_eq!(result, CompareResult::Equal);

        // large files report blocks the callback answers with abort
        let result = content
            .content_compare_files(
                Some(cb::content_progress),
                0,
                "/a.txt",
                "/large.txt",
                details.clone(),
            )
            .unwrap();
        assert_eq!(result, CompareResult::Aborted);

        let (record, _) = content.plugin("test").unwrap();
        assert!(record.callbacks().content_progress.is_none());
        let result = content
            .content_compare_files(None, 0, "/a.txt", "/large.txt", details)
            .unwrap();
        assert_eq!(result, CompareResult::NotEqual);
    }
}
