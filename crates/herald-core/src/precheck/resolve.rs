//! Placeholder resolution against a contact snapshot.

use crate::domain::contact::ContactSnapshot;
use crate::domain::template::Binding;

/// Outcome of resolving one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A non-empty value from the snapshot.
    Value(String),

    /// The underlying contact field is empty or absent.
    Empty,

    /// Resolves outside the snapshot; precheck never penalizes these.
    Dynamic,
}

/// Resolve one binding from the contact snapshot. Whitespace-only values
/// count as empty; a template rendered with them would read broken.
pub fn resolve(contact: &ContactSnapshot, binding: &Binding) -> Resolved {
    match binding {
        Binding::Name => from_option(contact.name.as_deref()),
        Binding::Phone => from_option(Some(contact.phone.as_str())),
        Binding::Email => from_option(contact.email.as_deref()),
        Binding::Custom(key) => from_option(contact.custom_fields.get(key).map(String::as_str)),
        Binding::Dynamic(_) => Resolved::Dynamic,
    }
}

fn from_option(value: Option<&str>) -> Resolved {
    match value {
        Some(v) if !v.trim().is_empty() => Resolved::Value(v.to_string()),
        _ => Resolved::Empty,
    }
}
