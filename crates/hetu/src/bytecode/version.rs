use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::{HetuError, RunResult};

/// Signature every bytecode module starts with.
pub const BYTECODE_MAGIC: u32 = u32::from_le_bytes(*b"HTVM");

/// A semantic version stamp with optional pre-release and build chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
    pub pre: Vec<String>,
    pub build: Vec<String>,
}

impl Version {
    /// The version this crate's builder stamps into module headers.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        )
    }

    #[must_use]
    pub fn new(major: u8, minor: u8, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// The compatibility rule for loading bytecode: a stable compiler only
    /// needs the same major; a 0.x compiler needs an exact version match.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        if self.major > 0 {
            self.major == other.major
        } else {
            self.major == other.major && self.minor == other.minor && self.patch == other.patch
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

/// Kind of a source unit, stamped in module headers and `file` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SourceType {
    /// Top-level statements run only on explicit invocation.
    Module = 0,
    /// Top-level statements run at load time.
    Script = 1,
    /// A code snippet evaluated directly in the global namespace.
    LiteralCode = 2,
    /// A JSON resource bundled alongside the code.
    Json = 3,
}

impl SourceType {
    pub(crate) fn from_byte(byte: u8) -> RunResult<Self> {
        match byte {
            0 => Ok(Self::Module),
            1 => Ok(Self::Script),
            2 => Ok(Self::LiteralCode),
            3 => Ok(Self::Json),
            other => Err(HetuError::bytecode(format!("unknown source type {other}"))),
        }
    }

    /// Whether top-level statements execute at load time.
    #[must_use]
    pub fn is_script_mode(self) -> bool {
        matches!(self, Self::Script | Self::LiteralCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_versions_match_on_major() {
        let a = Version::new(1, 2, 3);
        let b = Version::new(1, 9, 0);
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&Version::new(2, 2, 3)));
    }

    #[test]
    fn zero_major_requires_exact_match() {
        let a = Version::new(0, 5, 0);
        assert!(a.is_compatible_with(&Version::new(0, 5, 0)));
        assert!(!a.is_compatible_with(&Version::new(0, 5, 1)));
        assert!(!a.is_compatible_with(&Version::new(0, 6, 0)));
    }

    #[test]
    fn display_includes_pre_and_build_chunks() {
        let version = Version {
            major: 1,
            minor: 0,
            patch: 0,
            pre: vec!["beta".to_owned(), "2".to_owned()],
            build: vec!["51".to_owned()],
        };
        assert_eq!(version.to_string(), "1.0.0-beta.2+51");
    }
}
