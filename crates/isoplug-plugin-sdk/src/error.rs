use std::fmt;

/// Raised by a capability default when a plugin does not override an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotImplemented {
    pub method: &'static str,
    pub mandatory: bool,
}

impl NotImplemented {
    pub fn optional(method: &'static str) -> Self {
        Self {
            method,
            mandatory: false,
        }
    }

    pub fn mandatory(method: &'static str) -> Self {
        Self {
            method,
            mandatory: true,
        }
    }
}

impl fmt::Display for NotImplemented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mandatory {
            f.write_str("mandatory ")?;
        }
        write!(f, "method `{}` is not supported", self.method)
    }
}

impl std::error::Error for NotImplemented {}

/// Shorthand used by contract defaults.
pub fn optional<T>(method: &'static str) -> anyhow::Result<T> {
    Err(NotImplemented::optional(method).into())
}

pub fn mandatory<T>(method: &'static str) -> anyhow::Result<T> {
    Err(NotImplemented::mandatory(method).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_marks_mandatory_operations() {
        assert_eq!(
            NotImplemented::mandatory("find_first").to_string(),
            "mandatory method `find_first` is not supported"
        );
        assert_eq!(
            NotImplemented::optional("mk_dir").to_string(),
            "method `mk_dir` is not supported"
        );
    }
}
