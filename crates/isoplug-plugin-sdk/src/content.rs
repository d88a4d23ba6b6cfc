use crate::{
    error::{mandatory, optional},
    fs::RemoteInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FieldType {
    NoMoreFields = 0,
    Numeric32 = 1,
    Numeric64 = 2,
    NumericFloating = 3,
    Date = 4,
    Time = 5,
    Boolean = 6,
    MultipleChoice = 7,
    String = 8,
    FullText = 9,
    DateTime = 10,
    WideString = 11,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// `|`-separated unit names, empty when the field has none.
    pub units: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int32(_) => FieldType::Numeric32,
            FieldValue::Int64(_) => FieldType::Numeric64,
            FieldValue::Float(_) => FieldType::NumericFloating,
            FieldValue::Bool(_) => FieldType::Boolean,
            FieldValue::Text(_) => FieldType::WideString,
        }
    }
}

/// Outcome of a value lookup; the non-value variants map to negative codes.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueResult {
    Value(FieldValue),
    NoSuchField,
    FileError,
    FieldEmpty,
    OnDemand,
    Delayed,
}

impl ValueResult {
    pub fn code(&self) -> i32 {
        match self {
            ValueResult::Value(value) => value.field_type() as i32,
            ValueResult::Delayed => 0,
            ValueResult::NoSuchField => -1,
            ValueResult::FileError => -2,
            ValueResult::FieldEmpty => -3,
            ValueResult::OnDemand => -4,
        }
    }
}

/// Code returned by a successful `set_value` or `edit_value`.
pub const SET_SUCCESS: i32 = 0;
/// Code returned when the user cancels `edit_value`.
pub const SET_CANCEL: i32 = -6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SortOrder {
    Ascending = 1,
    Descending = -1,
}

/// Column layout suggested to the host for a file-system plugin's panel.
/// Each part is a `\r\n`-separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultView {
    pub contents: String,
    pub headers: String,
    pub widths: String,
    pub options: String,
}

/// Host notification sent through `send_state_information`.
pub mod state {
    pub const READ_NEW_DIR: i32 = 1;
    pub const REFRESH_PRESSED: i32 = 2;
    pub const SHOW_HINT: i32 = 4;
}

/// Outcome of `compare_files`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    NotEqual,
    Equal,
    /// Equal as text, ignoring encoding or line-ending differences.
    EqualText,
    /// Equal; the host shows the icon resource with this id (at least 100).
    EqualWithIcon(i32),
    Aborted,
    FileOpenError,
    CannotCompare,
}

impl CompareResult {
    pub fn code(self) -> i32 {
        match self {
            CompareResult::NotEqual => 0,
            CompareResult::Equal => 1,
            CompareResult::EqualText => 2,
            CompareResult::EqualWithIcon(id) if id >= 100 => id,
            CompareResult::EqualWithIcon(_) => 1,
            CompareResult::Aborted => -1,
            CompareResult::FileOpenError => -2,
            CompareResult::CannotCompare => -3,
        }
    }
}

/// Content/metadata capability contract.
pub trait ContentPlugin {
    /// Field description at `index`; `None` ends the field list.
    fn get_supported_field(&mut self, _index: i32) -> anyhow::Result<Option<FieldInfo>> {
        mandatory("get_supported_field")
    }

    fn get_value(
        &mut self,
        _file: &str,
        _field: i32,
        _unit: i32,
        _flags: i32,
    ) -> anyhow::Result<ValueResult> {
        mandatory("get_value")
    }

    fn stop_get_value(&mut self, _file: &str) -> anyhow::Result<()> {
        optional("stop_get_value")
    }

    fn plugin_unloading(&mut self) -> anyhow::Result<()> {
        optional("plugin_unloading")
    }

    fn set_value(
        &mut self,
        _file: &str,
        _field: i32,
        _unit: i32,
        _value: Option<FieldValue>,
        _flags: i32,
    ) -> anyhow::Result<bool> {
        optional("set_value")
    }

    fn get_default_sort_order(&mut self, _field: i32) -> anyhow::Result<SortOrder> {
        optional("get_default_sort_order")
    }

    /// Field flag bits; `field == -1` asks for the union over all fields.
    fn get_supported_field_flags(&mut self, _field: i32) -> anyhow::Result<i32> {
        optional("get_supported_field_flags")
    }

    /// Only asked of content served by a file-system plugin.
    fn get_default_view(&mut self, _max_len: usize) -> anyhow::Result<Option<DefaultView>> {
        optional("get_default_view")
    }

    /// Shows the plugin's own editor for a field. `value` holds the current
    /// value and receives the edited one; the result is a set-value code.
    fn edit_value(
        &mut self,
        _window: isize,
        _field: i32,
        _unit: i32,
        _value: &mut Option<FieldValue>,
        _flags: i32,
        _language: &str,
    ) -> anyhow::Result<i32> {
        optional("edit_value")
    }

    /// See [`state`] for the codes.
    fn send_state_information(&mut self, _state: i32, _path: &str) -> anyhow::Result<()> {
        optional("send_state_information")
    }

    /// Compares two files by content. Long comparisons report progress
    /// through [`crate::PluginCore::content_progress`].
    fn compare_files(
        &mut self,
        _index: i32,
        _first: &str,
        _second: &str,
        _details: &[RemoteInfo; 2],
    ) -> anyhow::Result<CompareResult> {
        optional("compare_files")
    }

    /// Detect string the host matches before loading the plugin.
    fn detect_string(&self) -> Option<String> {
        None
    }
}
