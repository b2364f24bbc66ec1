//! Phone number model
//!
//! Subscriber numbers are all digits: two area-code digits followed by
//! eight or nine subscriber digits.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A syntactically valid phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Shortest accepted number (area code + 8 digits)
    pub const MIN_LEN: usize = 10;

    /// Longest accepted number (area code + 9 digits)
    pub const MAX_LEN: usize = 11;

    /// Parse a phone number, rejecting anything that is not 10 or 11 digits
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        Self::try_from(raw.to_string())
    }

    /// Check the syntax without allocating
    #[inline]
    pub fn is_valid(raw: &str) -> bool {
        (Self::MIN_LEN..=Self::MAX_LEN).contains(&raw.len())
            && raw.bytes().all(|b| b.is_ascii_digit())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit area code
    pub fn area_code(&self) -> &str {
        &self.0[..2]
    }
}

impl FromStr for PhoneNumber {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(AppError::PhoneSyntax(format!(
                "{} must be {} or {} digits",
                value,
                Self::MIN_LEN,
                Self::MAX_LEN
            )))
        }
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
