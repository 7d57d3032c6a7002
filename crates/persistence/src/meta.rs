//! Metadata describing a stored item.

use serde::{Deserialize, Serialize};

/// Size, kind and extension of a stored item.
///
/// Directories always report a size of zero and an empty extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaInfo {
    /// Size of the content in bytes.
    pub total_size: u64,

    pub is_file: bool,

    /// Text after the last `.` of the name, empty when there is none.
    pub extension: String,
}

impl MetaInfo {
    pub fn file(total_size: u64, extension: impl Into<String>) -> Self {
        Self {
            total_size,
            is_file: true,
            extension: extension.into(),
        }
    }

    pub fn directory() -> Self {
        Self {
            total_size: 0,
            is_file: false,
            extension: String::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        !self.is_file
    }
}

/// Extension of `name`: the text after its last `.`, or empty.
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[idx + 1..],
        None => "",
    }
}
