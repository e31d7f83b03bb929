//! Contact snapshot and destination identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::ContactId;

/// Raw destination value that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a deliverable destination: {raw:?}")]
pub struct InvalidDestination {
    pub raw: String,
}

/// Normalized destination identity (E.164 phone).
///
/// Construction is the only way to get one, so any `Destination` in the
/// system is already normalized; string comparison is identity comparison.
/// Quarantine accounting and suppression lookups rely on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination(String);

impl Destination {
    /// Normalize a raw phone value into E.164 form.
    ///
    /// Separators (spaces, dashes, dots, parentheses) are dropped, a single
    /// leading `+` is allowed, and the digit count must land in the E.164
    /// range (8..=15). Anything else is rejected.
    pub fn parse(raw: &str) -> Result<Self, InvalidDestination> {
        let mut digits = String::with_capacity(raw.len());
        for (i, c) in raw.trim().char_indices() {
            match c {
                '0'..='9' => digits.push(c),
                '+' if i == 0 => {}
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => {
                    return Err(InvalidDestination {
                        raw: raw.to_string(),
                    });
                }
            }
        }

        if !(8..=15).contains(&digits.len()) {
            return Err(InvalidDestination {
                raw: raw.to_string(),
            });
        }

        Ok(Self(format!("+{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable view of a contact at precheck time.
///
/// Built-in fields (`name`, `phone`, `email`) plus free-form custom fields.
/// Precheck is a pure function of this snapshot, the template contract and
/// the suppression predicate; re-running it after a contact edit means
/// taking a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub contact_id: ContactId,
    pub name: Option<String>,
    pub phone: String,
    pub email: Option<String>,

    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

impl ContactSnapshot {
    pub fn new(contact_id: ContactId, phone: impl Into<String>) -> Self {
        Self {
            contact_id,
            name: None,
            phone: phone.into(),
            email: None,
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    /// Normalized destination for this contact.
    pub fn destination(&self) -> Result<Destination, InvalidDestination> {
        Destination::parse(&self.phone)
    }
}
