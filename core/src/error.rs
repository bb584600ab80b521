use thiserror::Error;

/// Host-level failures of the translation engine.
///
/// Guest faults never show up here; they are delivered to the
/// guest through exception processing.
#[derive(Debug, Error)]
pub enum JitError {
    #[error("failed to map code buffer: {0}")]
    CodeBuffer(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("guest RAM size {0:#x} is not a non-zero multiple of the code page size")]
    RamSize(usize),

    #[error("host architecture {0} is not supported")]
    UnsupportedHost(&'static str),
}

pub type Result<T> = std::result::Result<T, JitError>;
