//! Safe entry points per capability family. Each one obtains the plugin
//! through [`Wrapper`], calls the contract and leaves native encoding to the
//! export macros.

mod content;
mod fs;
mod lister;
mod packer;
mod quick_search;

pub use packer::status_of;

use anyhow::anyhow;
use isoplug_plugin_sdk::CapabilityKind;

use crate::handles::Handle;

fn contract_missing(kind: CapabilityKind) -> anyhow::Error {
    anyhow!("plugin type does not implement the {} contract", kind.contract())
}

fn unknown_handle(handle: Handle) -> anyhow::Error {
    anyhow!("handle {handle} is not open")
}
