//! Stock plugin linked into the template: exposes a folder of the local disk
//! as a file system and serves a couple of content fields for it.

use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use isoplug_plugin_sdk::{
    content::{FieldInfo, FieldType, FieldValue, ValueResult},
    fs::{CopyFlags, FindData, FsStatus, RemoteInfo},
    manifest::{LibraryManifest, TypeManifest},
    ContentPlugin, Cursor, FsPlugin, Plugin, PluginCore, Settings,
};

pub const TYPE_NAME: &str = "Isoplug.LocalFs";

const FIELDS: &[(&str, &str, FieldType)] = &[
    ("size", "bytes|kbytes", FieldType::Numeric64),
    ("extension", "", FieldType::WideString),
];

pub fn create(settings: Settings) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(LocalFs::new(settings)))
}

/// Manifest describing the stock types, for laying out a library next to the
/// wrapper.
pub fn manifest(library_name: &str) -> LibraryManifest {
    let methods = [
        "find_first",
        "find_next",
        "get_file",
        "put_file",
        "delete_file",
        "mk_dir",
        "remove_dir",
        "get_supported_field",
        "get_value",
    ];
    LibraryManifest {
        name: library_name.to_string(),
        version: Some(crate::VERSION.to_string()),
        description: Some("Local folder exposed as a plugin file system".into()),
        types: vec![TypeManifest {
            name: "LocalFs".into(),
            namespace: Some("Isoplug".into()),
            implements: vec!["FsPlugin".into(), "ContentPlugin".into()],
            base: None,
            methods: methods.iter().map(|m| m.to_string()).collect(),
            exported: true,
        }],
        ..Default::default()
    }
}

struct Listing {
    entries: Arc<[FindData]>,
    next: usize,
}

pub struct LocalFs {
    core: PluginCore,
    root: PathBuf,
}

impl LocalFs {
    fn new(settings: Settings) -> Self {
        let root = settings
            .get("root_folder")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            core: PluginCore::new(settings),
            root,
        }
    }

    /// Maps a host path (`\dir\file` or `/dir/file`) below the root folder.
    fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in remote.split(['\\', '/']).filter(|p| !p.is_empty()) {
            match Path::new(part).components().next() {
                Some(Component::Normal(_)) => path.push(part),
                _ => bail!("path `{remote}` leaves the root folder"),
            }
        }
        Ok(path)
    }

    fn step(entries: Arc<[FindData]>, next: usize) -> Option<(Cursor, FindData)> {
        let entry = entries.get(next)?.clone();
        let cursor: Cursor = Arc::new(Listing {
            entries,
            next: next + 1,
        });
        Some((cursor, entry))
    }
}

fn find_data(entry: &fs::DirEntry) -> Result<FindData> {
    let meta = entry.metadata()?;
    let name = entry.file_name().to_string_lossy().into_owned();
    let mut data = if meta.is_dir() {
        FindData::directory(name)
    } else {
        FindData::file(name, meta.len())
    };
    data.created = meta.created().ok();
    data.accessed = meta.accessed().ok();
    data.modified = meta.modified().ok();
    Ok(data)
}

fn copy(from: &Path, to: &Path, flags: CopyFlags) -> Result<FsStatus> {
    if !from.exists() {
        return Ok(FsStatus::NotFound);
    }
    if to.exists() && !flags.contains(CopyFlags::OVERWRITE) {
        return Ok(FsStatus::Exists);
    }
    if fs::copy(from, to).is_err() {
        return Ok(FsStatus::WriteError);
    }
    if flags.contains(CopyFlags::MOVE) {
        fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    }
    Ok(FsStatus::Ok)
}

impl Plugin for LocalFs {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn as_fs(&mut self) -> Option<&mut dyn FsPlugin> {
        Some(self)
    }

    fn as_content(&mut self) -> Option<&mut dyn ContentPlugin> {
        Some(self)
    }
}

impl FsPlugin for LocalFs {
    fn find_first(&mut self, path: &str) -> Result<Option<(Cursor, FindData)>> {
        let dir = self.resolve(path)?;
        let mut entries = Vec::new();
        let listing =
            fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))?;
        for entry in listing {
            entries.push(find_data(&entry?)?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self::step(entries.into(), 0))
    }

    fn find_next(&mut self, cursor: &Cursor) -> Result<Option<(Cursor, FindData)>> {
        let Some(listing) = cursor.downcast_ref::<Listing>() else {
            bail!("cursor does not belong to this plugin");
        };
        Ok(Self::step(Arc::clone(&listing.entries), listing.next))
    }

    fn get_file(
        &mut self,
        remote: &str,
        local: &mut String,
        flags: CopyFlags,
        _info: &RemoteInfo,
    ) -> Result<FsStatus> {
        if self.core.progress(remote, local, 0)? {
            return Ok(FsStatus::UserAbort);
        }
        let status = copy(&self.resolve(remote)?, Path::new(local.as_str()), flags)?;
        self.core.progress(remote, local, 100)?;
        Ok(status)
    }

    fn put_file(&mut self, local: &str, remote: &mut String, flags: CopyFlags) -> Result<FsStatus> {
        if self.core.progress(local, remote, 0)? {
            return Ok(FsStatus::UserAbort);
        }
        let status = copy(Path::new(local), &self.resolve(remote)?, flags)?;
        self.core.progress(local, remote, 100)?;
        Ok(status)
    }

    fn delete_file(&mut self, name: &str) -> Result<bool> {
        Ok(fs::remove_file(self.resolve(name)?).is_ok())
    }

    fn mk_dir(&mut self, name: &str) -> Result<bool> {
        Ok(fs::create_dir(self.resolve(name)?).is_ok())
    }

    fn remove_dir(&mut self, name: &str) -> Result<bool> {
        Ok(fs::remove_dir(self.resolve(name)?).is_ok())
    }

    fn root_name(&self) -> Option<String> {
        self.root.file_name().map(|name| name.to_string_lossy().into_owned())
    }
}

impl ContentPlugin for LocalFs {
    fn get_supported_field(&mut self, index: i32) -> Result<Option<FieldInfo>> {
        let field = usize::try_from(index).ok().and_then(|i| FIELDS.get(i));
        Ok(field.map(|(name, units, field_type)| FieldInfo {
            name: name.to_string(),
            units: units.to_string(),
            field_type: *field_type,
        }))
    }

    fn get_value(&mut self, file: &str, field: i32, unit: i32, _flags: i32) -> Result<ValueResult> {
        let path = Path::new(file);
        Ok(match field {
            0 => match fs::metadata(path) {
                Ok(meta) if meta.is_dir() => ValueResult::FieldEmpty,
                Ok(meta) if unit == 1 => {
                    ValueResult::Value(FieldValue::Int64((meta.len() / 1024) as i64))
                }
                Ok(meta) => ValueResult::Value(FieldValue::Int64(meta.len() as i64)),
                Err(_) => ValueResult::FileError,
            },
            1 => match path.extension() {
                Some(ext) => {
                    ValueResult::Value(FieldValue::Text(ext.to_string_lossy().into_owned()))
                }
                None => ValueResult::FieldEmpty,
            },
            _ => ValueResult::NoSuchField,
        })
    }
}
