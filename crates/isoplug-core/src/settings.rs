use std::{
    collections::BTreeMap,
    env::consts::DLL_EXTENSION,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{bail, Context, Result};
use isoplug_plugin_sdk::Settings;
use regex::Regex;
use serde::Deserialize;

/// Keys understood by the loader and the plugin base state.
pub const KNOWN_KEYS: &[&str] = &[
    "plugin_library",
    "plugin_class",
    "content_library",
    "content_class",
    "plugin_title",
    "icon_folder",
    "write_trace",
    "write_status_info",
    "hide_error_dialog",
    "use_title_for_trace",
    "initial_lease",
    "renew_on_call",
    "start_in_shared_context",
    "unload_expired",
    "gui_type",
];

const FLAG_KEYS: &[&str] = &[
    "write_trace",
    "write_status_info",
    "hide_error_dialog",
    "use_title_for_trace",
    "start_in_shared_context",
    "unload_expired",
];

/// Settings file layout: a single flat `[settings]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    settings: BTreeMap<String, toml::Value>,
}

/// `dir/foo.wfx` -> `dir/foo.wfx.toml`.
pub fn settings_path(wrapper: &Path) -> PathBuf {
    let mut name = wrapper.file_name().unwrap_or_default().to_os_string();
    name.push(".toml");
    wrapper.with_file_name(name)
}

/// Reads the settings associated with a wrapper. A missing file yields an
/// empty mapping.
pub fn load_wrapper_settings(wrapper: &Path) -> Result<Settings> {
    let path = settings_path(wrapper);
    if !path.exists() {
        tracing::debug!(wrapper = %wrapper.display(), "no settings file; using defaults");
        return Ok(Settings::new());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    parse_settings(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_settings(raw: &str) -> Result<Settings> {
    let expanded = interpolate_env(raw);
    let file = toml::from_str::<SettingsFile>(&expanded)?;
    file.settings
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(_)
                | toml::Value::Float(_)
                | toml::Value::Boolean(_)
                | toml::Value::Datetime(_) => value.to_string(),
                other => bail!("setting `{key}` must be a scalar, found {}", other.type_str()),
            };
            Ok((key, value))
        })
        .collect()
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
pub fn interpolate_env(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}").expect("static pattern compiles")
    });
    let result = regex.replace_all(input, |caps: &regex::Captures| {
        let key = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    });
    result.into_owned()
}

/// Plugin library for a wrapper: `plugin_library` relative to the wrapper's
/// folder, or the wrapper's stem with the platform library extension.
pub fn library_path(wrapper: &Path, settings: &Settings) -> PathBuf {
    let folder = wrapper.parent().unwrap_or_else(|| Path::new(""));
    match settings.get("plugin_library").filter(|s| !s.trim().is_empty()) {
        Some(library) => folder.join(library),
        None => {
            let stem = wrapper.file_stem().unwrap_or_default().to_string_lossy();
            folder.join(format!("{stem}.{DLL_EXTENSION}"))
        }
    }
}

/// Content library for a file-system wrapper, defaulting to the plugin library.
pub fn content_library_path(wrapper: &Path, settings: &Settings, library: &Path) -> PathBuf {
    let folder = wrapper.parent().unwrap_or_else(|| Path::new(""));
    settings
        .get("content_library")
        .filter(|s| !s.trim().is_empty())
        .map(|s| folder.join(s))
        .unwrap_or_else(|| library.to_path_buf())
}

/// Expands `%PLUGIN%` in `icon_folder` to the plugin folder.
pub fn icon_folder(settings: &Settings) -> Option<PathBuf> {
    let raw = settings.get("icon_folder")?;
    let folder = settings.get("plugin_folder").unwrap_or_default();
    Some(PathBuf::from(raw.replace("%PLUGIN%", folder)))
}

/// Reports unknown keys and malformed flag or duration values.
pub fn validate(settings: &Settings) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    for (key, value) in settings.iter() {
        if !KNOWN_KEYS.contains(&key) && key != "plugin_folder" {
            warnings.push(format!("unknown setting `{key}`"));
        }
        if FLAG_KEYS.contains(&key)
            && !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "false" | "1" | "0" | "yes" | "no"
            )
        {
            bail!("setting `{key}` must be a boolean, found `{value}`");
        }
    }
    for key in ["initial_lease", "renew_on_call"] {
        if let Some(value) = settings.get(key) {
            if settings.duration(key).is_none() {
                bail!("setting `{key}` must be seconds or hh:mm:ss, found `{value}`");
            }
        }
    }
    Ok(warnings)
}

/// Commented template written next to synthesized wrappers.
pub fn example_settings() -> &'static str {
    r#"# Settings for an isoplug wrapper. Values may use ${ENV_VAR} or ${ENV_VAR:default}.
[settings]
# Plugin library, relative to this file. Defaults to the wrapper name.
# plugin_library = "MyPlugin.dll"
# plugin_class = "MyCompany.MyPlugin"
# content_library = "MyContent.dll"
# content_class = "MyCompany.MyContent"
# plugin_title = "My plugin"
# icon_folder = "%PLUGIN%/icons"
write_trace = false
write_status_info = false
hide_error_dialog = false
use_title_for_trace = false
# Lease on the plugin object, in seconds or hh:mm:ss. Unset means infinite.
# initial_lease = "00:05:00"
# renew_on_call = "00:01:00"
start_in_shared_context = false
unload_expired = true
# gui_type = "winforms"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_stringified() {
        let settings = parse_settings(
            "[settings]\nplugin_library = \"Foo.dll\"\nwrite_trace = true\ninitial_lease = 90\n",
        )
        .unwrap();
        assert_eq!(settings.get("plugin_library"), Some("Foo.dll"));
        assert!(settings.flag("write_trace"));
        assert_eq!(settings.get("initial_lease"), Some("90"));
    }

    #[test]
    fn tables_are_rejected() {
        assert!(parse_settings("[settings.nested]\na = 1\n").is_err());
    }

    #[test]
    fn environment_defaults_apply() {
        let out = interpolate_env("dir = \"${ISOPLUG_TEST_UNSET_VAR:/opt/plugins}\"");
        assert_eq!(out, "dir = \"/opt/plugins\"");
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_wrapper_settings(&dir.path().join("none.wfx")).unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn library_defaults_to_wrapper_stem() {
        let wrapper = Path::new("/plugins/sample.wfx");
        let settings = Settings::new();
        assert_eq!(
            library_path(wrapper, &settings),
            PathBuf::from(format!("/plugins/sample.{DLL_EXTENSION}"))
        );
        let settings: Settings = [("plugin_library", "lib/Foo.dll")].into_iter().collect();
        assert_eq!(library_path(wrapper, &settings), PathBuf::from("/plugins/lib/Foo.dll"));
        assert_eq!(settings_path(wrapper), PathBuf::from("/plugins/sample.wfx.toml"));
    }

    #[test]
    fn icon_folder_expands_plugin_marker() {
        let settings: Settings = [("icon_folder", "%PLUGIN%/icons"), ("plugin_folder", "/p")]
            .into_iter()
            .collect();
        assert_eq!(icon_folder(&settings), Some(PathBuf::from("/p/icons")));
    }

    #[test]
    fn validation_flags_bad_values() {
        let ok: Settings = [("write_trace", "yes"), ("initial_lease", "00:01:00"), ("custom", "x")]
            .into_iter()
            .collect();
        assert_eq!(validate(&ok).unwrap(), vec!["unknown setting `custom`".to_string()]);
        let bad: Settings = [("unload_expired", "sometimes")].into_iter().collect();
        assert!(validate(&bad).is_err());
        let bad: Settings = [("renew_on_call", "later")].into_iter().collect();
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn example_parses() {
        let settings = parse_settings(example_settings()).unwrap();
        assert!(validate(&settings).unwrap().is_empty());
        assert!(settings.flag("unload_expired"));
    }
}
