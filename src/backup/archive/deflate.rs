use serde::{Deserialize, Serialize};
use validator::Validate;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Default compression level (balance of speed vs size)
static DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Configuration for deflate compression inside the zip entry
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeflateConfig {
    /// Compression level (0-9)
    ///
    /// - 0: Fastest, largest files
    /// - 6: Default
    /// - 9: Slowest, smallest files
    #[validate(range(min = 0, max = 9))]
    #[serde(default)]
    level: Option<u32>,
}

impl DeflateConfig {
    pub fn new(level: Option<u32>) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u32 {
        self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL)
    }

    pub(super) fn file_options(&self) -> FileOptions {
        let level = self.level();
        tracing::debug!("Creating deflate entry with level={}", level);
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level as i32))
    }
}
