//! Entry point a plugin library exports so the host can build its types.
//!
//! The host maps the library named in the wrapper settings, looks up the
//! descriptor function (by default [`DEFAULT_ENTRY`]) and only accepts the
//! table when both the ABI revision and the SDK version match its own.
//! Plugin objects cross the boundary as Rust trait objects, so host and
//! library must be built against the same SDK.

use crate::{Plugin, Settings};

/// Bumped whenever [`PluginDescriptor`] changes shape.
pub const ABI_VERSION: u32 = 1;

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Symbol looked up when the library manifest names no other entry.
pub const DEFAULT_ENTRY: &str = "isoplug_plugin_descriptor";

pub type Constructor = fn(Settings) -> anyhow::Result<Box<dyn Plugin>>;

/// Signature of the descriptor function.
pub type DescriptorEntry = fn() -> &'static PluginDescriptor;

/// One constructible type, keyed by its qualified manifest name.
#[derive(Debug, Clone, Copy)]
pub struct ExportedType {
    pub name: &'static str,
    pub create: Constructor,
}

#[derive(Debug)]
pub struct PluginDescriptor {
    pub abi_version: u32,
    pub sdk_version: &'static str,
    pub types: &'static [ExportedType],
}

impl PluginDescriptor {
    pub fn find(&self, type_name: &str) -> Option<&ExportedType> {
        self.types.iter().find(|ty| ty.name == type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.iter().map(|ty| ty.name)
    }
}

/// Exports the descriptor function of a plugin library.
///
/// ```ignore
/// isoplug_plugin_sdk::export_plugins! {
///     "Foo.MyFs" => my_fs::create,
///     "Foo.MyContent" => my_content::create,
/// }
/// ```
///
/// `entry = name;` as the first item exports the table under another symbol;
/// the library manifest must then name it in its `entry` field.
#[macro_export]
macro_rules! export_plugins {
    (entry = $entry:ident; $($name:expr => $create:path),* $(,)?) => {
        #[no_mangle]
        pub fn $entry() -> &'static $crate::descriptor::PluginDescriptor {
            static DESCRIPTOR: $crate::descriptor::PluginDescriptor =
                $crate::descriptor::PluginDescriptor {
                    abi_version: $crate::descriptor::ABI_VERSION,
                    sdk_version: $crate::descriptor::SDK_VERSION,
                    types: &[$($crate::descriptor::ExportedType {
                        name: $name,
                        create: $create,
                    }),*],
                };
            &DESCRIPTOR
        }
    };
    ($($name:expr => $create:path),* $(,)?) => {
        $crate::export_plugins!(entry = isoplug_plugin_descriptor; $($name => $create),*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginCore;

    struct Empty(PluginCore);

    impl Plugin for Empty {
        fn core(&self) -> &PluginCore {
            &self.0
        }

        fn core_mut(&mut self) -> &mut PluginCore {
            &mut self.0
        }
    }

    fn create(settings: Settings) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Empty(PluginCore::new(settings))))
    }

    crate::export_plugins! {
        entry = test_descriptor;
        "Test.Empty" => create,
    }

    #[test]
    fn exported_table_carries_versions_and_types() {
        let entry: DescriptorEntry = test_descriptor;
        let descriptor = entry();
        assert_eq!(descriptor.abi_version, ABI_VERSION);
        assert_eq!(descriptor.sdk_version, SDK_VERSION);
        assert_eq!(descriptor.type_names().collect::<Vec<_>>(), vec!["Test.Empty"]);

        let settings: Settings = [("plugin_title", "made")].into_iter().collect();
        let plugin = (descriptor.find("Test.Empty").unwrap().create)(settings).unwrap();
        assert_eq!(plugin.core().title(), "made");
        assert!(descriptor.find("Test.Other").is_none());
    }
}
