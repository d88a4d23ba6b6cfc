//! Export classification: which native exports a plugin library can drop.

use std::{collections::BTreeSet, path::Path};

use isoplug_plugin_sdk::CapabilityKind;

use super::SynthError;
use crate::resolver::{ResolvedType, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportClass {
    /// Must be declared by the plugin type.
    Mandatory,
    /// Excluded from the wrapper unless the plugin type declares it.
    Optional,
    /// Implemented by the wrapper itself; never excluded.
    HostLocal,
}

/// One operation of a capability contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSpec {
    /// Export name without the kind prefix, e.g. `GetFile`.
    pub export: &'static str,
    /// Contract method the plugin type declares, e.g. `get_file`.
    pub method: &'static str,
    pub class: ExportClass,
    /// Declaring any of these counts as declaring `method`.
    pub substitutes: &'static [&'static str],
}

const fn mandatory(export: &'static str, method: &'static str) -> ExportSpec {
    ExportSpec {
        export,
        method,
        class: ExportClass::Mandatory,
        substitutes: &[],
    }
}

const fn optional(export: &'static str, method: &'static str) -> ExportSpec {
    ExportSpec {
        export,
        method,
        class: ExportClass::Optional,
        substitutes: &[],
    }
}

const fn host(export: &'static str) -> ExportSpec {
    ExportSpec {
        export,
        method: "",
        class: ExportClass::HostLocal,
        substitutes: &[],
    }
}

const FS: &[ExportSpec] = &[
    mandatory("FindFirst", "find_first"),
    mandatory("FindNext", "find_next"),
    optional("GetFile", "get_file"),
    optional("PutFile", "put_file"),
    optional("RenMovFile", "ren_mov_file"),
    optional("DeleteFile", "delete_file"),
    optional("RemoveDir", "remove_dir"),
    optional("MkDir", "mk_dir"),
    ExportSpec {
        export: "ExecuteFile",
        method: "execute_file",
        class: ExportClass::Optional,
        substitutes: &["execute_open", "execute_properties", "execute_command"],
    },
    optional("SetAttr", "set_attr"),
    optional("SetTime", "set_time"),
    optional("Disconnect", "disconnect"),
    optional("ExtractCustomIcon", "extract_custom_icon"),
    optional("GetPreviewBitmap", "get_preview_bitmap"),
    optional("GetLocalName", "get_local_name"),
    host("Init"),
    host("FindClose"),
    host("SetCryptCallback"),
    host("GetDefRootName"),
    host("SetDefaultParams"),
    host("GetBackgroundFlags"),
    host("LinksToLocalFiles"),
    host("StatusInfo"),
];

const CONTENT: &[ExportSpec] = &[
    mandatory("GetSupportedField", "get_supported_field"),
    mandatory("GetValue", "get_value"),
    optional("StopGetValue", "stop_get_value"),
    optional("GetDefaultSortOrder", "get_default_sort_order"),
    optional("PluginUnloading", "plugin_unloading"),
    optional("GetSupportedFieldFlags", "get_supported_field_flags"),
    optional("SetValue", "set_value"),
    optional("GetDefaultView", "get_default_view"),
    optional("EditValue", "edit_value"),
    optional("SendStateInformation", "send_state_information"),
    optional("CompareFiles", "compare_files"),
    host("GetDetectString"),
    host("SetDefaultParams"),
];

const PACKER: &[ExportSpec] = &[
    mandatory("OpenArchive", "open_archive"),
    mandatory("ReadHeader", "read_header"),
    mandatory("ProcessFile", "process_file"),
    mandatory("CloseArchive", "close_archive"),
    optional("PackFiles", "pack_files"),
    optional("DeleteFiles", "delete_files"),
    optional("ConfigurePacker", "configure_packer"),
    optional("StartMemPack", "start_mem_pack"),
    optional("PackToMem", "pack_to_mem"),
    optional("DoneMemPack", "done_mem_pack"),
    optional("CanYouHandleThisFile", "can_you_handle_this_file"),
    host("SetChangeVolProc"),
    host("SetProcessDataProc"),
    host("PkSetCryptCallback"),
    host("GetPackerCaps"),
    host("PackSetDefaultParams"),
    host("GetBackgroundFlags"),
];

const LISTER: &[ExportSpec] = &[
    mandatory("Load", "load"),
    optional("LoadNext", "load_next"),
    optional("CloseWindow", "close_window"),
    optional("SearchText", "search_text"),
    optional("SendCommand", "send_command"),
    optional("Print", "print"),
    optional("NotificationReceived", "notification_received"),
    optional("GetPreviewBitmap", "get_preview_bitmap"),
    optional("SearchDialog", "search_dialog"),
    host("GetDetectString"),
    host("SetDefaultParams"),
];

const QUICK_SEARCH: &[ExportSpec] = &[
    mandatory("MatchFile", "match_file"),
    mandatory("MatchGetSetOptions", "match_get_set_options"),
];

/// Classification table of a capability kind.
pub fn table(kind: CapabilityKind) -> &'static [ExportSpec] {
    match kind {
        CapabilityKind::Content => CONTENT,
        CapabilityKind::FileSystem => FS,
        CapabilityKind::Lister => LISTER,
        CapabilityKind::Packer => PACKER,
        CapabilityKind::QuickSearch => QUICK_SEARCH,
    }
}

impl ExportSpec {
    fn declared_by(&self, ty: &ResolvedType) -> bool {
        ty.declares(self.method) || self.substitutes.iter().any(|s| ty.declares(s))
    }
}

/// Export names to remove from a wrapper, with the kind prefix applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    names: BTreeSet<String>,
}

impl Exclusions {
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// True for an excluded name, or its wide variant (`...W`).
    pub fn excludes(&self, method: &str) -> bool {
        self.names.contains(method)
            || method
                .strip_suffix('W')
                .is_some_and(|narrow| self.names.contains(narrow))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Optional operations `library` does not implement for `kind`, unprefixed.
///
/// The first type implementing the contract that declares every mandatory
/// operation decides.
pub fn excluded_operations(
    resolver: &Resolver,
    library: &Path,
    kind: CapabilityKind,
) -> Result<Vec<&'static ExportSpec>, SynthError> {
    let types = resolver.types_implementing(library, kind.contract())?;
    let Some(first) = types.first() else {
        return Err(SynthError::NoCapability {
            kind,
            library: library.to_path_buf(),
        });
    };
    let table = table(kind);
    let missing = |ty: &ResolvedType| -> Vec<String> {
        table
            .iter()
            .filter(|spec| spec.class == ExportClass::Mandatory && !spec.declared_by(ty))
            .map(|spec| spec.method.to_string())
            .collect()
    };
    for ty in &types {
        let missed = missing(ty);
        if !missed.is_empty() {
            tracing::warn!(
                ty = %ty.full_name,
                missing = %missed.join(","),
                "mandatory operations not implemented"
            );
            continue;
        }
        tracing::debug!(ty = %ty.full_name, %kind, "classifying exports");
        return Ok(table
            .iter()
            .filter(|spec| spec.class == ExportClass::Optional && !spec.declared_by(ty))
            .collect());
    }
    Err(SynthError::MissingMandatory {
        ty: first.full_name.clone(),
        missing: missing(first),
        library: library.to_path_buf(),
    })
}

/// Builds the exclusion list for a wrapper of `kind`.
///
/// File-system wrappers also carry `FsContent*` exports. Those are classified
/// against `content` (or the plugin library itself) and all of them go when no
/// usable content type exists.
pub fn exclusions(
    resolver: &Resolver,
    library: &Path,
    content: Option<&Path>,
    kind: CapabilityKind,
) -> Result<Exclusions, SynthError> {
    let mut out = Exclusions::default();
    let prefix = kind.export_prefix();
    for spec in excluded_operations(resolver, library, kind)? {
        out.insert(format!("{prefix}{}", spec.export));
    }
    if kind == CapabilityKind::FileSystem {
        let content_library = content.unwrap_or(library);
        let content_prefix = format!("{prefix}{}", CapabilityKind::Content.export_prefix());
        match excluded_operations(resolver, content_library, CapabilityKind::Content) {
            Ok(specs) => {
                for spec in specs {
                    out.insert(format!("{content_prefix}{}", spec.export));
                }
            }
            Err(err @ (SynthError::NoCapability { .. } | SynthError::MissingMandatory { .. })) => {
                tracing::info!(
                    library = %content_library.display(),
                    "no content type ({err}); excluding all content exports"
                );
                for spec in CONTENT {
                    out.insert(format!("{content_prefix}{}", spec.export));
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}
