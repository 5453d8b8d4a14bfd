// Codec Configuration
//
// Fixes the width of the text length header and an optional tighter
// limit on text size. Loaded from JSON like any other server config.

use serde::{Deserialize, Serialize};

/// Width of the length header written before every text value.
///
/// The header is always fixed width so a reader knows its size up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderWidth {
    /// 2-byte unsigned header.
    Short,

    /// 4-byte signed header, compatible with a Java `int` length.
    #[default]
    Int,
}

impl HeaderWidth {
    /// Number of bytes the header occupies.
    pub const fn size(self) -> usize {
        match self {
            HeaderWidth::Short => 2,
            HeaderWidth::Int => 4,
        }
    }

    /// Largest content length the header can represent.
    pub const fn max_len(self) -> u64 {
        match self {
            HeaderWidth::Short => u16::MAX as u64,
            HeaderWidth::Int => i32::MAX as u64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Codec configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub header_width: HeaderWidth,

    /// Optional cap below the header maximum. Bounds what a reader will
    /// accept from a corrupt header as well as what a writer may emit.
    #[serde(default)]
    pub max_text_len: Option<u64>,
}

impl CodecConfig {
    pub fn with_header_width(header_width: HeaderWidth) -> Self {
        Self {
            header_width,
            max_text_len: None,
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: CodecConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = self.max_text_len {
            if limit > self.header_width.max_len() {
                return Err(ConfigError::Invalid(format!(
                    "max_text_len {limit} exceeds {:?} header maximum {}",
                    self.header_width,
                    self.header_width.max_len()
                )));
            }
        }
        Ok(())
    }

    /// The limit actually enforced on text content.
    pub fn effective_max_len(&self) -> u64 {
        let header_max = self.header_width.max_len();
        self.max_text_len
            .map_or(header_max, |limit| limit.min(header_max))
    }
}
