//! End-to-end synthesis: disassemble, classify, rewrite, reassemble.

use std::path::{Path, PathBuf};

use isoplug_plugin_sdk::{manifest::manifest_path, CapabilityKind, LibraryManifest};
use tokio::fs;

use super::{
    classify, resources,
    rewrite::{self, Rewritten},
    tools::{self, Invocation},
    SynthError,
};
use crate::{config::ToolchainConfig, resolver::Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bitness {
    X32,
    X64,
    #[default]
    Both,
}

impl Bitness {
    fn targets(self) -> &'static [bool] {
        match self {
            Bitness::X32 => &[false],
            Bitness::X64 => &[true],
            Bitness::Both => &[false, true],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IconSource {
    #[default]
    None,
    File(PathBuf),
    /// The `icon` named in the plugin library's manifest.
    FromManifest,
}

/// One synthesis request.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Explicit template; otherwise the toolchain's template for `kind`.
    pub template: Option<PathBuf>,
    pub kind: Option<CapabilityKind>,
    pub plugin: PathBuf,
    /// Separate content library for file-system wrappers.
    pub content: Option<PathBuf>,
    /// Output name, optionally with a folder; relative folders are taken
    /// from the plugin library's folder.
    pub output: Option<PathBuf>,
    pub icon: IconSource,
    pub release: bool,
    pub bitness: Bitness,
}

#[derive(Debug, Clone, Default)]
pub struct SynthReport {
    pub kind: Option<CapabilityKind>,
    pub excluded: Vec<String>,
    pub exports: Vec<String>,
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl SynthReport {
    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

/// Drives the external toolchain for one or more synthesis runs.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: ToolchainConfig,
    resolver: Resolver,
}

impl Synthesizer {
    pub fn new(config: ToolchainConfig) -> Self {
        Self {
            config,
            resolver: Resolver::new(),
        }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub async fn run(&self, options: &SynthOptions) -> Result<SynthReport, SynthError> {
        let template = self.template_path(options)?;
        if !options.plugin.is_file() {
            return Err(SynthError::PluginMissing(options.plugin.clone()));
        }
        tools::ensure_present(&self.config.assembler, "assembler")?;
        tools::ensure_present(&self.config.disassembler, "disassembler")?;
        tracing::info!(
            template = %template.display(),
            plugin = %options.plugin.display(),
            "synthesizing wrapper"
        );

        let work = self.config.work_dir();
        fs::create_dir_all(&work).await.map_err(SynthError::io(&work))?;
        let mut report = SynthReport::default();

        let source = self.disassemble(&template, &work).await?;
        let kind = template_kind(&template, &source, options.kind)?;
        report.kind = Some(kind);
        let declared = rewrite::exports(&source)?;
        if declared.is_empty() {
            return Err(SynthError::NoExports(template));
        }
        tracing::info!(%kind, exports = declared.len(), "template loaded");

        let (out_dir, out_name) = output_names(options, kind);
        fs::create_dir_all(&out_dir).await.map_err(SynthError::io(&out_dir))?;

        let excluded = classify::exclusions(
            &self.resolver,
            &options.plugin,
            options.content.as_deref(),
            kind,
        )?;
        for name in excluded.iter() {
            if !declared.iter().any(|d| d.method == name || d.method == format!("{name}W")) {
                tracing::debug!(method = name, "excluded method is not in the template");
            }
        }
        let Rewritten { text, removed, exports } = rewrite::rewrite(&source, &excluded)?;
        report.excluded = removed;
        report.exports = exports;
        let edited = work.join("output.il");
        fs::write(&edited, text).await.map_err(SynthError::io(&edited))?;

        let manifest = self.resolver.load_manifest(&options.plugin).ok();
        let resource = self
            .compile_resources(options, manifest.as_ref(), &work, &mut report)
            .await;

        for &x64 in options.bitness.targets() {
            let built = self.assemble(
                &edited,
                &template,
                &work,
                resource.as_deref(),
                options.release,
                x64,
            ).await?;
            let target = wrapper_file(&out_dir, &out_name, kind, x64);
            fs::copy(&built, &target).await.map_err(SynthError::io(&target))?;
            tracing::info!(wrapper = %target.display(), x64, "wrapper written");
            write_settings(&target, kind, &options.plugin).await?;
            report.outputs.push(target);
        }

        copy_plugin(&options.plugin, &out_dir).await?;
        if self.config.install_archive && kind != CapabilityKind::QuickSearch {
            self.install_archive(options, manifest.as_ref(), kind, &out_dir, &out_name, &mut report)
                .await;
        }
        if self.config.clear_work_dir {
            if let Err(err) = fs::remove_dir_all(&work).await {
                report.warn(format!("failed to clear {}: {err}", work.display()));
            }
        }
        Ok(report)
    }

    fn template_path(&self, options: &SynthOptions) -> Result<PathBuf, SynthError> {
        let template = match (&options.template, options.kind) {
            (Some(path), _) => path.clone(),
            (None, Some(kind)) => self
                .config
                .template_for(kind)
                .ok_or_else(|| SynthError::TemplateMissing(PathBuf::from(kind.short_name())))?,
            (None, None) => return Err(SynthError::TemplateMissing(PathBuf::new())),
        };
        if !template.is_file() {
            return Err(SynthError::TemplateMissing(template));
        }
        Ok(template)
    }

    async fn disassemble(&self, template: &Path, work: &Path) -> Result<String, SynthError> {
        let source = work.join("input.il");
        let invocation = Invocation {
            input: Some(template),
            output: Some(&source),
            flags: Vec::new(),
        };
        tools::run(&self.config.disassembler, &invocation).await?;
        tracing::debug!(source = %source.display(), "disassembled");
        fs::read_to_string(&source).await.map_err(SynthError::io(&source))
    }

    /// Best-effort: any failure here is a warning and yields no resource.
    async fn compile_resources(
        &self,
        options: &SynthOptions,
        manifest: Option<&LibraryManifest>,
        work: &Path,
        report: &mut SynthReport,
    ) -> Option<PathBuf> {
        let Some(rc) = &self.config.resource_compiler else {
            report.warn("no resource compiler configured; version info is not added");
            return None;
        };
        if let Err(err) = tools::ensure_present(rc, "resource compiler") {
            report.warn(err.to_string());
            return None;
        }
        let Some(manifest) = manifest else {
            report.warn(format!(
                "no manifest for {}; version info is not added",
                options.plugin.display()
            ));
            return None;
        };
        let icon = self.icon(options, manifest, report);
        let script = work.join("input.rc");
        let compiled = work.join("input.res");
        let text = resources::version_resource(manifest, crate::version(), icon.as_deref());
        if let Err(err) = fs::write(&script, text).await {
            report.warn(format!("failed to write {}: {err}", script.display()));
            return None;
        }
        let invocation = Invocation {
            input: Some(&script),
            output: Some(&compiled),
            flags: Vec::new(),
        };
        match tools::run(rc, &invocation).await {
            Ok(()) if compiled.is_file() => Some(compiled),
            Ok(()) => {
                report.warn(format!("resource compiler produced no {}", compiled.display()));
                None
            }
            Err(err) => {
                report.warn(format!("file {}: {err}", script.display()));
                None
            }
        }
    }

    fn icon(
        &self,
        options: &SynthOptions,
        manifest: &LibraryManifest,
        report: &mut SynthReport,
    ) -> Option<PathBuf> {
        let icon = match &options.icon {
            IconSource::None => return None,
            IconSource::File(path) => path.clone(),
            IconSource::FromManifest => {
                let folder = options.plugin.parent().unwrap_or_else(|| Path::new(""));
                folder.join(manifest.icon.as_deref()?)
            }
        };
        if icon.is_file() {
            tracing::info!(icon = %icon.display(), "plugin icon added");
            Some(icon)
        } else {
            report.warn(format!("icon {} does not exist", icon.display()));
            None
        }
    }

    async fn assemble(
        &self,
        source: &Path,
        template: &Path,
        work: &Path,
        resource: Option<&Path>,
        release: bool,
        x64: bool,
    ) -> Result<PathBuf, SynthError> {
        let built = work.join(template.file_name().unwrap_or_default());
        let mut flags = Vec::new();
        if let Some(resource) = resource {
            flags.push(format!("/res:{}", resource.display()));
        }
        if release {
            flags.push("/optimize".to_string());
        }
        if x64 {
            flags.extend(["/x64".to_string(), "/PE64".to_string()]);
        }
        let invocation = Invocation {
            input: Some(source),
            output: Some(&built),
            flags,
        };
        tools::run(&self.config.assembler, &invocation).await?;
        Ok(built)
    }

    async fn install_archive(
        &self,
        options: &SynthOptions,
        manifest: Option<&LibraryManifest>,
        kind: CapabilityKind,
        out_dir: &Path,
        out_name: &str,
        report: &mut SynthReport,
    ) {
        let Some(archiver) = &self.config.archiver else {
            tracing::info!("no archiver configured; installation archive is not created");
            return;
        };
        if let Err(err) = tools::ensure_present(archiver, "archiver") {
            report.warn(format!("{err}; installation archive is not created"));
            return;
        }
        let inf = out_dir.join("pluginst.inf");
        if !inf.exists() {
            let description = manifest.and_then(|m| m.description.as_deref());
            let info = resources::install_info(kind, out_name, description);
            if let Err(err) = fs::write(&inf, info).await {
                report.warn(format!("failed to write {}: {err}", inf.display()));
                return;
            }
        }
        let mut files: Vec<String> = Vec::new();
        for output in &report.outputs {
            files.push(output.display().to_string());
            let settings = crate::settings::settings_path(output);
            if settings.exists() {
                files.push(settings.display().to_string());
            }
        }
        for file in [options.plugin.clone(), manifest_path(&options.plugin), inf.clone()] {
            if file.exists() {
                files.push(file.display().to_string());
            }
        }
        let archive = out_dir.join(format!("{out_name}.zip"));
        let invocation = Invocation {
            input: Some(&inf),
            output: Some(&archive),
            flags: files,
        };
        match tools::run(archiver, &invocation).await {
            Ok(()) => {
                tracing::info!(archive = %archive.display(), "installation archive created");
                let _ = fs::remove_file(&inf).await;
            }
            Err(err) => report.warn(format!("installation archive failed: {err}")),
        }
    }
}

/// The template's own `.capability` directive wins over `requested`.
fn template_kind(
    template: &Path,
    source: &str,
    requested: Option<CapabilityKind>,
) -> Result<CapabilityKind, SynthError> {
    let declared = rewrite::capabilities(source);
    let kind = match declared.as_slice() {
        [] => requested.ok_or_else(|| SynthError::UnknownCapability(template.to_path_buf()))?,
        [first, rest @ ..] => {
            if let Some(second) = rest.iter().find(|k| *k != first) {
                return Err(SynthError::AmbiguousCapability {
                    template: template.to_path_buf(),
                    first: *first,
                    second: *second,
                });
            }
            *first
        }
    };
    if let Some(requested) = requested.filter(|r| *r != kind) {
        tracing::warn!(
            %requested,
            template_kind = %kind,
            "template capability overrides the requested kind"
        );
    }
    Ok(kind)
}

/// Output folder and wrapper stem.
fn output_names(options: &SynthOptions, kind: CapabilityKind) -> (PathBuf, String) {
    let plugin_dir = options.plugin.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    let stem = |path: &Path| path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    match &options.output {
        None if kind == CapabilityKind::QuickSearch => (plugin_dir, "tcmatch".to_string()),
        None => (plugin_dir, stem(&options.plugin)),
        Some(output) => {
            let folder = output.parent().unwrap_or_else(|| Path::new(""));
            let dir = if folder.is_absolute() {
                folder.to_path_buf()
            } else {
                plugin_dir.join(folder)
            };
            (dir, stem(output))
        }
    }
}

/// `name.ext`, or its 64-bit form: `name.ext64`, or `name64.dll` for quick search.
fn wrapper_file(dir: &Path, name: &str, kind: CapabilityKind, x64: bool) -> PathBuf {
    let ext = kind.extension();
    let file = match (x64, kind) {
        (false, _) => format!("{name}.{ext}"),
        (true, CapabilityKind::QuickSearch) => format!("{name}64.{ext}"),
        (true, _) => format!("{name}.{ext}64"),
    };
    dir.join(file)
}

async fn write_settings(
    wrapper: &Path,
    kind: CapabilityKind,
    plugin: &Path,
) -> Result<(), SynthError> {
    let path = crate::settings::settings_path(wrapper);
    if path.exists() {
        return Ok(());
    }
    let library = plugin.file_name().unwrap_or_default().to_string_lossy();
    fs::write(&path, resources::wrapper_settings(kind, &library))
        .await
        .map_err(SynthError::io(&path))
}

/// Copies the plugin library and its manifest next to the wrapper.
async fn copy_plugin(plugin: &Path, out_dir: &Path) -> Result<(), SynthError> {
    let folder = plugin.parent().unwrap_or_else(|| Path::new(""));
    let same = match (fs::canonicalize(folder).await, fs::canonicalize(out_dir).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => folder == out_dir,
    };
    if same {
        return Ok(());
    }
    for file in [plugin.to_path_buf(), manifest_path(plugin)] {
        if let Some(name) = file.file_name().filter(|_| file.exists()) {
            let target = out_dir.join(name);
            fs::copy(&file, &target).await.map_err(SynthError::io(&target))?;
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;
    use crate::{config::Tool, synth::tools::tests::script, testing::write_manifest};

    const TEMPLATE: &str = r#".capability qs
.class public Exports
{
  .method public static int32 MatchFileW(string filter, string name) cil managed
  {
    .export [1] as MatchFileW
    ret
  } // end of method Exports::MatchFileW
  .method public static int32 MatchGetSetOptions(int32 status) cil managed
  {
    .export [2] as MatchGetSetOptions
    ret
  } // end of method Exports::MatchGetSetOptions
}
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        synth: Synthesizer,
        template: PathBuf,
    }

    /// Disassembler copies the template text; assembler copies the edited source.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let template = root.join("isoplug_qs.dll");
        fs::write(&template, TEMPLATE).unwrap();
        let mut config = ToolchainConfig {
            work_dir: Some(root.join("work")),
            install_archive: false,
            ..Default::default()
        };
        config.disassembler = Tool::disassembler(script(
            root,
            "dis.sh",
            "cp \"$1\" \"${2#/out:}\"",
        ));
        config.assembler = Tool::assembler(script(
            root,
            "asm.sh",
            "out=\"${2#/out:}\"\ncp \"$1\" \"$out\"\nshift 3\necho \"$@\" >> \"$out\"",
        ));
        Fixture {
            synth: Synthesizer::new(config),
            template,
            dir,
        }
    }

    fn plugin(dir: &Path, methods: serde_json::Value) -> PathBuf {
        let library = write_manifest(
            dir,
            "Finder",
            serde_json::json!({
                "name": "Finder",
                "version": "2.1.0",
                "types": [{
                    "name": "Finder",
                    "implements": ["QuickSearchPlugin"],
                    "methods": methods
                }]
            }),
        );
        fs::write(&library, b"\x7fELF").unwrap();
        library
    }

    #[tokio::test]
    async fn builds_both_bitnesses_with_settings() {
        let fx = fixture();
        let plugin = plugin(
            fx.dir.path(),
            serde_json::json!(["match_file", "match_get_set_options"]),
        );
        let options = SynthOptions {
            template: Some(fx.template.clone()),
            plugin,
            release: true,
            ..Default::default()
        };
        let report = fx.synth.run(&options).await.unwrap();
        assert_eq!(report.kind, Some(CapabilityKind::QuickSearch));
        assert!(report.excluded.is_empty());
        assert_eq!(report.exports, ["MatchFileW", "MatchGetSetOptions"]);
        let names: Vec<_> = report
            .outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["tcmatch.dll", "tcmatch64.dll"]);

        let wide = fs::read_to_string(&report.outputs[1]).unwrap();
        assert!(wide.contains("/optimize /x64 /PE64"));
        let settings = crate::settings::load_wrapper_settings(&report.outputs[0]).unwrap();
        assert_eq!(settings.get("plugin_library"), Some("Finder.dll"));
        assert!(report.warnings.iter().any(|w| w.contains("resource compiler")));
    }

    #[tokio::test]
    async fn missing_mandatory_operation_aborts() {
        let fx = fixture();
        let plugin = plugin(fx.dir.path(), serde_json::json!(["match_file"]));
        let options = SynthOptions {
            template: Some(fx.template.clone()),
            plugin,
            bitness: Bitness::X32,
            ..Default::default()
        };
        let err = fx.synth.run(&options).await.unwrap_err();
        assert!(matches!(
            &err,
            SynthError::MissingMandatory { missing, .. } if missing == &["match_get_set_options"]
        ));
        assert!(!fx.dir.path().join("tcmatch.dll").exists());
    }

    #[tokio::test]
    async fn failing_assembler_is_fatal() {
        let mut fx = fixture();
        fx.synth.config.assembler = Tool::assembler(script(fx.dir.path(), "bad.sh", "exit 2"));
        let plugin = plugin(
            fx.dir.path(),
            serde_json::json!(["match_file", "match_get_set_options"]),
        );
        let options = SynthOptions {
            template: Some(fx.template.clone()),
            plugin,
            output: Some(PathBuf::from("out/custom")),
            bitness: Bitness::X64,
            ..Default::default()
        };
        let err = fx.synth.run(&options).await.unwrap_err();
        assert!(matches!(err, SynthError::Subprocess { .. }));
    }

    #[test]
    fn output_names_follow_the_plugin() {
        let options = SynthOptions {
            plugin: PathBuf::from("/p/Foo.dll"),
            output: Some(PathBuf::from("out/Bar.wfx")),
            ..Default::default()
        };
        let (dir, name) = output_names(&options, CapabilityKind::FileSystem);
        assert_eq!(dir, PathBuf::from("/p/out"));
        assert_eq!(name, "Bar");
        assert_eq!(
            wrapper_file(&dir, &name, CapabilityKind::FileSystem, true),
            PathBuf::from("/p/out/Bar.wfx64")
        );
    }

    #[test]
    fn conflicting_template_capabilities_are_rejected() {
        let err = template_kind(
            Path::new("t"),
            ".capability fs\n.capability packer\n",
            None,
        ).unwrap_err();
        assert!(matches!(err, SynthError::AmbiguousCapability { .. }));
        assert!(matches!(
            template_kind(Path::new("t"), "", None),
            Err(SynthError::UnknownCapability(_))
        ));
        assert_eq!(
            template_kind(Path::new("t"), "", Some(CapabilityKind::Lister)).unwrap(),
            CapabilityKind::Lister
        );
    }
}
