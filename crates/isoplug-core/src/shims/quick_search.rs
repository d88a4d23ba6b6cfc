use anyhow::Result;
use isoplug_plugin_sdk::{CapabilityKind, QuickSearchPlugin};

use super::contract_missing;
use crate::wrapper::Wrapper;

impl Wrapper {
    fn quick_search<R, F>(&self, signature: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn QuickSearchPlugin) -> Result<R> + Send + 'static,
    {
        self.invoke(signature, move |plugin| match plugin.as_quick_search() {
            Some(qs) => f(qs),
            None => Err(contract_missing(CapabilityKind::QuickSearch)),
        })
    }

    pub fn match_file(&self, filter: &str, file_name: &str) -> Result<bool> {
        let (filter, file_name) = (filter.to_string(), file_name.to_string());
        self.quick_search("MatchFileW", move |qs| qs.match_file(&filter, &file_name))
    }

    pub fn match_get_set_options(&self, status: i32) -> Result<i32> {
        self.quick_search("MatchGetSetOptions", move |qs| qs.match_get_set_options(status))
    }
}
