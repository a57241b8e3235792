//! Error type for `load_instrument_table`, in the teacher's hand-rolled
//! style (no `thiserror`): a small enum with `Display`/`Error` impls and a
//! `From` conversion for each wrapped error source.

use std::fmt;

#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file was read but is not valid TOML, or does not match the
    /// `[melody.*]`/`[drum.*]` document shape.
    Toml(toml::de::Error),
    /// A recognized key held a value the engine cannot use (an
    /// unrecognized `wave_form`, a bank/program/note key that isn't a
    /// valid `u8`, an unrecognized `system_type`).
    InvalidEntry { section: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read instrument table: {e}"),
            ConfigError::Toml(e) => write!(f, "invalid instrument table TOML: {e}"),
            ConfigError::InvalidEntry { section, reason } => {
                write!(f, "invalid entry in [{section}]: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Toml(e) => Some(e),
            ConfigError::InvalidEntry { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e)
    }
}
