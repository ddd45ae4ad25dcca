//! Run-level configuration errors.
//!
//! The only fatal error class: everything row- or shard-level is counted
//! and isolated instead. Raised before any row is processed.

#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = ConfigError::new("unknown storage mode 'cloud'");
        assert_eq!(
            format!("{err}"),
            "configuration error: unknown storage mode 'cloud'"
        );
    }
}
