//! Codec configuration.

use serde::{Deserialize, Serialize};

/// How fixed-length buffers and strings treat payloads of the wrong size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedLengthPolicy {
    /// Zero-pad short payloads, reject long ones.
    #[default]
    Pad,
    /// Reject any payload whose length differs from the declared length.
    Strict,
}

/// Options shared by every write and read of a [`PackSchema`](crate::PackSchema).
///
/// Hosts can load these from JSON:
///
/// ```
/// use pack::{FixedLengthPolicy, PackOptions};
///
/// let options = PackOptions::from_json(r#"{"fixed_length": "strict"}"#).unwrap();
/// assert_eq!(options.fixed_length, FixedLengthPolicy::Strict);
/// assert!(options.bounds_check);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Validate remaining length before composite reads. When off, a short
    /// buffer panics inside the cursor instead of returning an error.
    pub bounds_check: bool,
    pub fixed_length: FixedLengthPolicy,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            bounds_check: true,
            fixed_length: FixedLengthPolicy::Pad,
        }
    }
}

impl PackOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(PackOptions::from_json("{}").unwrap(), PackOptions::default());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(PackOptions::from_json(r#"{"fixed_length": "truncate"}"#).is_err());
    }

    #[test]
    fn test_bounds_check_off() {
        let options = PackOptions::from_json(r#"{"bounds_check": false}"#).unwrap();
        assert!(!options.bounds_check);
        assert_eq!(options.fixed_length, FixedLengthPolicy::Pad);
    }
}
