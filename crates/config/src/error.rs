use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Settings file exists but cannot be read.
    Io(String),
    /// TOML parse / deserialization error.
    Parse(String),
    /// A value is out of range.
    Validation(String),
    /// Required credentials are absent or blank. Holds the env var names.
    MissingCredentials(Vec<&'static str>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read settings: {msg}"),
            Self::Parse(msg) => write!(f, "settings parse error: {msg}"),
            Self::Validation(msg) => write!(f, "settings validation error: {msg}"),
            Self::MissingCredentials(vars) => {
                write!(f, "missing credentials: {}", vars.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}
