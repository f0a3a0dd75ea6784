use std::fmt;

use serde::{Deserialize, Serialize};

/// Trust tier achieved by a descriptor's signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Signed by the root authority.
    Root,
    /// Signed by a root-certified organization within its scope.
    Org,
    /// Signed by enough registered community keys.
    Community,
    #[default]
    Unsigned,
}

impl TrustLevel {
    /// Ordered severity: lower value = more trusted.
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Root => 0,
            Self::Org => 1,
            Self::Community => 2,
            Self::Unsigned => 3,
        }
    }

    /// Returns the more trusted of two levels.
    #[must_use]
    pub fn max_trust(self, other: Self) -> Self {
        if self.severity() <= other.severity() {
            self
        } else {
            other
        }
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        !matches!(self, Self::Unsigned)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Org => f.write_str("org"),
            Self::Community => f.write_str("community"),
            Self::Unsigned => f.write_str("unsigned"),
        }
    }
}
