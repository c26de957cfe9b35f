//! License tiers and context modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-supplied quota class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    #[default]
    Free,
    Standard,
    Pro,
}

/// How much project content is assembled into the prompt.
///
/// Ordered from richest to leanest: `Full > Smart > Minimal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Full,
    #[default]
    Smart,
    Minimal,
}

impl LicenseTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Pro => "pro",
        }
    }
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Smart => "smart",
            Self::Minimal => "minimal",
        }
    }

    /// The next leaner mode, if any.
    pub fn downgrade(&self) -> Option<Self> {
        match self {
            Self::Full => Some(Self::Smart),
            Self::Smart => Some(Self::Minimal),
            Self::Minimal => None,
        }
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "pro" => Ok(Self::Pro),
            other => Err(format!("unknown license tier '{other}' (expected free, standard or pro)")),
        }
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "smart" => Ok(Self::Smart),
            "minimal" => Ok(Self::Minimal),
            other => Err(format!("unknown context mode '{other}' (expected full, smart or minimal)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("PRO".parse::<LicenseTier>().unwrap(), LicenseTier::Pro);
        assert_eq!(" Smart ".parse::<ContextMode>().unwrap(), ContextMode::Smart);
        assert!("gold".parse::<LicenseTier>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&LicenseTier::Standard).unwrap(), "\"standard\"");
        let mode: ContextMode = serde_json::from_str("\"minimal\"").unwrap();
        assert_eq!(mode, ContextMode::Minimal);
    }

    #[test]
    fn downgrade_chain() {
        assert_eq!(ContextMode::Full.downgrade(), Some(ContextMode::Smart));
        assert_eq!(ContextMode::Smart.downgrade(), Some(ContextMode::Minimal));
        assert_eq!(ContextMode::Minimal.downgrade(), None);
    }
}
