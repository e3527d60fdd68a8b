//! Strongly-typed identifiers used across the domain.
//!
//! The backing schema uses plain integer keys, so every id wraps an `i32`.
//! New invoice and invoice-line ids come from storage sequences (`i64`) and
//! are narrowed with [`InvoiceId::try_from_sequence`] and friends.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a customer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(i32);

/// Identifier of a catalog track.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(i32);

/// Identifier of an invoice header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(i32);

/// Identifier of an invoice line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceLineId(i32);

macro_rules! impl_int_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i32) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i32 {
                self.0
            }

            /// Narrow a sequence value into this id.
            ///
            /// Sequence values are positive `bigint`s; anything that does not
            /// fit a positive `i32` is rejected.
            pub fn try_from_sequence(value: i64) -> Result<Self, DomainError> {
                match i32::try_from(value) {
                    Ok(v) if v > 0 => Ok(Self(v)),
                    _ => Err(DomainError::invalid_id(format!(
                        "{}: sequence value {} out of range",
                        $name, value
                    ))),
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i32> for $t {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i32 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_int_newtype!(CustomerId, "CustomerId");
impl_int_newtype!(TrackId, "TrackId");
impl_int_newtype!(InvoiceId, "InvoiceId");
impl_int_newtype!(InvoiceLineId, "InvoiceLineId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_values_must_fit_positive_i32() {
        assert_eq!(InvoiceId::try_from_sequence(413).unwrap(), InvoiceId::new(413));
        assert!(InvoiceId::try_from_sequence(0).is_err());
        assert!(InvoiceLineId::try_from_sequence(-3).is_err());
        assert!(InvoiceLineId::try_from_sequence(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn parses_from_string() {
        let id: TrackId = " 3503 ".parse().unwrap();
        assert_eq!(id.get(), 3503);

        let err = "abc".parse::<CustomerId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) if msg.starts_with("CustomerId") => {}
            other => panic!("Expected InvalidId, got {other:?}"),
        }
    }
}
