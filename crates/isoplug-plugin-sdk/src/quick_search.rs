use crate::error::mandatory;

/// Quick-search capability contract.
pub trait QuickSearchPlugin {
    fn match_file(&mut self, _filter: &str, _file_name: &str) -> anyhow::Result<bool> {
        mandatory("match_file")
    }

    /// Exchanges match options; `status` carries the host's exact-name state.
    fn match_get_set_options(&mut self, _status: i32) -> anyhow::Result<i32> {
        mandatory("match_get_set_options")
    }
}
