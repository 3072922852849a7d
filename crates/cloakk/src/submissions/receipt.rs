use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RECEIPT_PREFIX: &str = "CLOAKK";

const GROUPS: usize = 3;
const GROUP_LEN: usize = 4;

/// Opaque public handle returned to an anonymous submitter, e.g. `CLOAKK-3F9A-0B1C-77D2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptCode(String);

impl ReceiptCode {
    /// Build a code from twelve uppercase hex symbols.
    fn from_symbols(symbols: &str) -> Self {
        let groups: Vec<&str> = (0..GROUPS)
            .map(|index| &symbols[index * GROUP_LEN..(index + 1) * GROUP_LEN])
            .collect();
        Self(format!("{RECEIPT_PREFIX}-{}", groups.join("-")))
    }

    /// Accept only the canonical `CLOAKK-XXXX-XXXX-XXXX` shape.
    pub fn parse(raw: &str) -> Result<Self, InvalidReceiptCode> {
        let mut parts = raw.split('-');
        if parts.next() != Some(RECEIPT_PREFIX) {
            return Err(InvalidReceiptCode(raw.to_string()));
        }

        let groups: Vec<&str> = parts.collect();
        let well_formed = groups.len() == GROUPS
            && groups.iter().all(|group| {
                group.len() == GROUP_LEN
                    && group
                        .chars()
                        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            });

        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidReceiptCode(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReceiptCode {
    type Error = InvalidReceiptCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReceiptCode> for String {
    fn from(value: ReceiptCode) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a CLOAKK-XXXX-XXXX-XXXX receipt code")]
pub struct InvalidReceiptCode(pub String);

/// Source of receipt codes. Codes are not guaranteed unique; the store enforces that.
pub trait ReceiptCodeGenerator: Send + Sync {
    fn generate(&self) -> ReceiptCode;
}

/// Derives codes from the first 48 bits of a random UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomReceiptCodes;

impl ReceiptCodeGenerator for RandomReceiptCodes {
    fn generate(&self) -> ReceiptCode {
        let hex = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        ReceiptCode::from_symbols(&hex[..GROUPS * GROUP_LEN])
    }
}
