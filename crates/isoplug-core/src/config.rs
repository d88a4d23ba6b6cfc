use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::settings::interpolate_env;

/// Placeholders recognised in tool argument templates.
pub const PLACEHOLDERS: &[&str] = &["{input}", "{output}", "{flags}"];

/// Synthesizer toolchain settings, read from `isoplug.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub assembler: Tool,
    pub disassembler: Tool,
    pub resource_compiler: Option<Tool>,
    pub archiver: Option<Tool>,
    /// Folder holding the per-kind wrapper templates.
    pub template_dir: Option<PathBuf>,
    /// Scratch folder; defaults to `isoplug-synth` under the system temp dir.
    pub work_dir: Option<PathBuf>,
    pub clear_work_dir: bool,
    pub install_archive: bool,
}

/// An external program plus its argument template.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Tool {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            assembler: Tool::assembler("ilasm"),
            disassembler: Tool::disassembler("ildasm"),
            resource_compiler: None,
            archiver: None,
            template_dir: None,
            work_dir: None,
            clear_work_dir: false,
            install_archive: true,
        }
    }
}

impl Tool {
    pub fn assembler(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: vec!["{input}".into(), "/out:{output}".into(), "/dll".into(), "{flags}".into()],
        }
    }

    pub fn disassembler(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: vec!["{input}".into(), "/out:{output}".into()],
        }
    }

    pub fn resource_compiler(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: vec!["/v".into(), "/fo".into(), "{output}".into(), "{input}".into()],
        }
    }

    pub fn archiver(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: vec!["-j".into(), "-q".into(), "{output}".into(), "{flags}".into()],
        }
    }

    pub fn validate(&self, role: &str) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            bail!("{role} path must not be empty");
        }
        if !self.args.iter().any(|arg| arg.contains("{input}")) {
            bail!("{role} arguments must reference {{input}}");
        }
        for arg in &self.args {
            let mut rest = arg.as_str();
            while let Some(start) = rest.find('{') {
                let Some(len) = rest[start..].find('}') else {
                    break;
                };
                let placeholder = &rest[start..start + len + 1];
                if !PLACEHOLDERS.contains(&placeholder) {
                    bail!("{role} argument `{arg}` uses unknown placeholder {placeholder}");
                }
                rest = &rest[start + len + 1..];
            }
        }
        Ok(())
    }
}

impl ToolchainConfig {
    /// Validates tool entries and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        self.assembler.validate("assembler")?;
        self.disassembler.validate("disassembler")?;
        if let Some(rc) = &self.resource_compiler {
            rc.validate("resource compiler")?;
        }
        if let Some(archiver) = &self.archiver {
            if archiver.path.as_os_str().is_empty() {
                bail!("archiver path must not be empty");
            }
        }
        if let Some(dir) = &self.template_dir {
            if dir.as_os_str().is_empty() {
                bail!("template_dir must not be empty when set");
            }
        }
        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("isoplug-synth"))
    }

    /// Default template for `kind`, looked up in `template_dir`.
    pub fn template_for(&self, kind: isoplug_plugin_sdk::CapabilityKind) -> Option<PathBuf> {
        let file = format!("isoplug_{}.{}", kind.short_name(), std::env::consts::DLL_EXTENSION);
        self.template_dir.as_ref().map(|dir| dir.join(file))
    }
}

/// Reads a toolchain file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ToolchainConfig> {
    if !path.exists() {
        tracing::debug!(config = %path.display(), "no toolchain file; using defaults");
        return Ok(ToolchainConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<ToolchainConfig> {
    let expanded = interpolate_env(raw);
    Ok(toml::from_str::<ToolchainConfig>(&expanded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_default_templates() {
        let cfg = parse_config(
            "template_dir = \"/opt/isoplug\"\n[assembler]\npath = \"/usr/bin/ilasm\"\n",
        )
        .unwrap();
        assert_eq!(cfg.assembler.path, PathBuf::from("/usr/bin/ilasm"));
        assert!(cfg.assembler.args.is_empty());
        assert_eq!(cfg.disassembler.args, Tool::disassembler("x").args);
        assert!(cfg.install_archive);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_placeholders_are_rejected() {
        let mut cfg = ToolchainConfig::default();
        cfg.validate().unwrap();
        cfg.disassembler.args.push("{target}".into());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("{target}"));
    }

    #[test]
    fn bundled_example_is_valid() {
        let cfg = parse_config(include_str!("../../../config/isoplug.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert!(cfg.resource_compiler.is_some());
        assert_eq!(cfg.archiver.unwrap().path, PathBuf::from("zip"));
    }

    #[test]
    fn template_names_follow_the_kind() {
        let cfg = ToolchainConfig {
            template_dir: Some(PathBuf::from("/t")),
            ..Default::default()
        };
        let path = cfg.template_for(isoplug_plugin_sdk::CapabilityKind::Packer).unwrap();
        assert!(path.to_string_lossy().starts_with("/t/isoplug_packer."));
    }
}
