//! Export-table synthesizer.
//!
//! Turns a generic wrapper template into a wrapper that only exports the
//! operations a given plugin library implements. Every stage is usable on its
//! own: [`classify`] decides what goes, [`rewrite`] edits the disassembled
//! text, [`tools`] drives the external programs, [`resources`] renders the
//! side files and [`pipeline`] ties them together.

pub mod classify;
pub mod pipeline;
pub mod resources;
pub mod rewrite;
pub mod tools;

use std::path::PathBuf;

use isoplug_plugin_sdk::CapabilityKind;

use crate::resolver::ResolveError;

pub use classify::{ExportClass, ExportSpec, Exclusions};
pub use pipeline::{Bitness, IconSource, SynthOptions, SynthReport, Synthesizer};

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("`{tool}` exited with {status}")]
    Subprocess { tool: String, status: String },
    #[error("failed to start `{tool}`")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot locate the {role} `{path}`")]
    ToolMissing { role: &'static str, path: PathBuf },
    #[error("wrapper template `{0}` is empty or does not exist")]
    TemplateMissing(PathBuf),
    #[error("plugin library `{0}` is empty or does not exist")]
    PluginMissing(PathBuf),
    #[error(
        "type `{ty}` in {library} does not implement mandatory operations: {}",
        missing.join(", ")
    )]
    MissingMandatory {
        ty: String,
        missing: Vec<String>,
        library: PathBuf,
    },
    #[error("{kind} plugin is not implemented in {library}")]
    NoCapability { kind: CapabilityKind, library: PathBuf },
    #[error("wrapper template `{template}` declares more than one capability ({first}, {second})")]
    AmbiguousCapability {
        template: PathBuf,
        first: CapabilityKind,
        second: CapabilityKind,
    },
    #[error("cannot tell the capability of wrapper template `{0}`; pass the kind explicitly")]
    UnknownCapability(PathBuf),
    #[error("no methods to export, check the wrapper template `{0}`")]
    NoExports(PathBuf),
    #[error("unbalanced braces in method `{method}` starting at line {line}")]
    Unbalanced { method: String, line: usize },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SynthError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SynthError::Io { path, source }
    }
}
