//! # Installment Reference Codes
//!
//! Human-readable codes of the form `PREFIX-YYYY-MM-NNN`, e.g.
//! `ABO-2026-10-007`. The sequence is scoped to one negotiation and one
//! calendar month, and is handed out by a counter row in storage; this module
//! only formats, parses and bounds it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConflictError, ValidationError};
use crate::validation::validate_reference_prefix;
use crate::MAX_REFERENCE_SEQUENCE;

/// A parsed installment reference code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceCode {
    prefix: String,
    year: i32,
    month: u32,
    sequence: u32,
}

impl ReferenceCode {
    /// Builds the code for a counter value handed out by storage.
    ///
    /// ## Errors
    /// `ReferenceSpaceExhausted` when `sequence` is past 999.
    pub fn new(
        negotiation_id: &str,
        prefix: &str,
        year: i32,
        month: u32,
        sequence: u32,
    ) -> Result<Self, ConflictError> {
        if sequence > MAX_REFERENCE_SEQUENCE {
            return Err(ConflictError::ReferenceSpaceExhausted {
                negotiation_id: negotiation_id.to_string(),
                year,
                month,
            });
        }
        Ok(ReferenceCode {
            prefix: prefix.to_string(),
            year,
            month,
            sequence,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:02}-{:03}",
            self.prefix, self.year, self.month, self.sequence
        )
    }
}

impl FromStr for ReferenceCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "reference_code".to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split('-').collect();
        let [prefix, year, month, sequence] = parts.as_slice() else {
            return Err(invalid("expected PREFIX-YYYY-MM-NNN"));
        };

        validate_reference_prefix(prefix).map_err(|_| invalid("bad prefix"))?;
        if year.len() != 4 || month.len() != 2 || sequence.len() != 3 {
            return Err(invalid("expected PREFIX-YYYY-MM-NNN"));
        }

        let year: i32 = year.parse().map_err(|_| invalid("bad year"))?;
        let month: u32 = month.parse().map_err(|_| invalid("bad month"))?;
        let sequence: u32 = sequence.parse().map_err(|_| invalid("bad sequence"))?;
        if !(1..=12).contains(&month) {
            return Err(invalid("month out of range"));
        }
        if sequence == 0 {
            return Err(invalid("sequence starts at 001"));
        }

        Ok(ReferenceCode {
            prefix: prefix.to_string(),
            year,
            month,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let code = ReferenceCode::new("n", "ABO", 2026, 3, 7).unwrap();
        assert_eq!(code.to_string(), "ABO-2026-03-007");
    }

    #[test]
    fn test_parse() {
        let code: ReferenceCode = "ABO-2026-10-123".parse().unwrap();
        assert_eq!(code.prefix(), "ABO");
        assert_eq!(code.year(), 2026);
        assert_eq!(code.month(), 10);
        assert_eq!(code.sequence(), 123);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "ABO-2026-10",
            "ABO-2026-13-001",
            "ABO-2026-10-000",
            "ABO-26-10-001",
            "abo-2026-10-001",
            "ABO-2026-10-01",
            "ABO-2026-10-0001",
            "ABO-X-2026-10-001",
        ] {
            assert!(bad.parse::<ReferenceCode>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_sequence_bound() {
        assert!(ReferenceCode::new("n", "ABO", 2026, 10, 999).is_ok());
        assert!(matches!(
            ReferenceCode::new("n", "ABO", 2026, 10, 1_000),
            Err(ConflictError::ReferenceSpaceExhausted { .. })
        ));
    }

    #[test]
    fn test_ordering_follows_sequence() {
        let a = ReferenceCode::new("n", "ABO", 2026, 10, 9).unwrap();
        let b = ReferenceCode::new("n", "ABO", 2026, 10, 10).unwrap();
        assert!(a < b);
        // Zero padding keeps string order aligned too
        assert!(a.to_string() < b.to_string());
    }
}
