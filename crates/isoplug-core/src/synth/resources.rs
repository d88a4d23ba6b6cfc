//! Side files written around a synthesized wrapper.

use std::{fmt::Write as _, path::Path};

use isoplug_plugin_sdk::{CapabilityKind, LibraryManifest};

const DEFAULT_DESCRIPTION: &str = "...Put your description here...";

/// Version-info resource script describing the plugin library.
pub fn version_resource(
    manifest: &LibraryManifest,
    template_version: &str,
    icon: Option<&Path>,
) -> String {
    let version = manifest.semver().unwrap_or_else(|| semver::Version::new(0, 0, 0));
    let numeric = format!("{},{},{},0", version.major, version.minor, version.patch);

    let mut values = String::new();
    let mut value = |key: &str, text: Option<&str>| {
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            let _ = writeln!(values, "    VALUE \"{key}\", \"{}\"", escape(text));
        }
    };
    value("Comments", manifest.description.as_deref());
    value("CompanyName", manifest.company.as_deref());
    value("FileDescription", manifest.description.as_deref());
    value("FileVersion", manifest.version.as_deref());
    value("InternalName", Some(&manifest.name));
    value("LegalCopyright", manifest.copyright.as_deref());
    value("ProductName", manifest.product.as_deref());
    value("ProductVersion", manifest.version.as_deref());
    value("Assembly Version", Some(template_version));

    let mut rc = String::new();
    let _ = writeln!(rc, "1 VERSIONINFO");
    let _ = writeln!(rc, "FILEVERSION {numeric}");
    let _ = writeln!(rc, "PRODUCTVERSION {numeric}");
    rc.push_str("FILEOS 0x4\nFILETYPE 0x2\n");
    rc.push_str("{\nBLOCK \"StringFileInfo\"\n{\n  BLOCK \"000004b0\"\n  {\n");
    rc.push_str(&values);
    rc.push_str("  }\n}\nBLOCK \"VarFileInfo\"\n{\n  VALUE \"Translation\", 0x0000 0x04B0\n}\n}\n");
    if let Some(icon) = icon {
        let _ = writeln!(rc, "\nICON_1 ICON \"{}\"", escape(&icon.display().to_string()));
    }
    rc
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\"\"")
}

/// Settings file placed next to a freshly synthesized wrapper.
pub fn wrapper_settings(kind: CapabilityKind, plugin_library: &str) -> String {
    let mut out = String::from("[settings]\n");
    let _ = writeln!(out, "plugin_library = \"{plugin_library}\"");
    out.push_str("# plugin_title = \"???\"\n");
    if kind == CapabilityKind::FileSystem {
        out.push_str("write_status_info = true\n");
    }
    out.push_str("write_trace = true\n\n# plugin settings go here\n");
    out
}

/// `pluginst.inf` used by the host's automatic installer.
pub fn install_info(kind: CapabilityKind, wrapper_name: &str, description: Option<&str>) -> String {
    let ext = kind.extension();
    let mut out = String::from("[plugininstall]\n");
    let _ = writeln!(out, "description={}", description.unwrap_or(DEFAULT_DESCRIPTION));
    let _ = writeln!(out, "type={ext}");
    let _ = writeln!(out, "file={wrapper_name}.{ext}");
    let _ = writeln!(out, "defaultdir=isoplug_{wrapper_name}");
    if kind == CapabilityKind::Packer {
        out.push_str("defaultextension=???\n");
    }
    out
}
