//! Template contract: which placeholders a template requires, and where
//! their values come from.
//!
//! Template authoring and component rendering live upstream; dispatch only
//! needs the *contract*: the list of required placeholder keys per section
//! and the binding each key resolves through.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Template section a placeholder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSection {
    Header,
    Body,
    ButtonUrl,
}

/// Where a placeholder's value comes from.
///
/// `Dynamic` bindings resolve against data outside the contact snapshot
/// (send-time values, system fields); precheck never counts them missing.
/// Authoring-time completeness and runtime resolvability are different
/// failure classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Binding {
    /// Built-in contact name field.
    Name,

    /// Built-in contact phone field.
    Phone,

    /// Built-in contact email field.
    Email,

    /// Arbitrary custom-field key on the contact.
    Custom(String),

    /// Resolved outside the contact snapshot; carries a display label.
    Dynamic(String),
}

impl Binding {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Binding::Dynamic(_))
    }

    /// Humanized label for fix-it UIs ("delivery_date" -> "Delivery Date").
    pub fn label(&self) -> String {
        match self {
            Binding::Name => "Name".to_string(),
            Binding::Phone => "Phone".to_string(),
            Binding::Email => "Email".to_string(),
            Binding::Custom(key) => humanize(key),
            Binding::Dynamic(label) => label.clone(),
        }
    }
}

fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in key.split(['_', '-', '.']).filter(|w| !w.is_empty()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// One required placeholder: raw token, section, binding.
///
/// `raw` is whatever the template carries, positional (`{{1}}`) or named
/// (`{{name}}`), and is echoed back verbatim in precheck skip reasons so a
/// caller can point at the exact token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub raw: String,
    pub section: TemplateSection,
    pub binding: Binding,
}

impl Placeholder {
    pub fn new(raw: impl Into<String>, section: TemplateSection, binding: Binding) -> Self {
        Self {
            raw: raw.into(),
            section,
            binding,
        }
    }
}

/// The required-variable contract of one approved template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContract {
    pub name: String,
    pub language: String,
    pub required: Vec<Placeholder>,
}

impl TemplateContract {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            required: Vec::new(),
        }
    }

    pub fn with_placeholder(
        mut self,
        raw: impl Into<String>,
        section: TemplateSection,
        binding: Binding,
    ) -> Self {
        self.required.push(Placeholder::new(raw, section, binding));
        self
    }
}

impl fmt::Display for TemplateContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::snake("delivery_date", "Delivery Date")]
    #[case::kebab("last-order", "Last Order")]
    #[case::dotted("address.city", "Address City")]
    #[case::single("plan", "Plan")]
    fn custom_binding_labels_are_humanized(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(Binding::Custom(key.to_string()).label(), expected);
    }

    #[test]
    fn builtin_and_dynamic_labels() {
        assert_eq!(Binding::Name.label(), "Name");
        assert_eq!(Binding::Dynamic("Tracking Link".to_string()).label(), "Tracking Link");
        assert!(Binding::Dynamic("x".to_string()).is_dynamic());
        assert!(!Binding::Custom("x".to_string()).is_dynamic());
    }

    #[test]
    fn contract_builder_collects_placeholders() {
        let contract = TemplateContract::new("order_update", "pt_BR")
            .with_placeholder("{{1}}", TemplateSection::Body, Binding::Name)
            .with_placeholder("{{2}}", TemplateSection::Body, Binding::Custom("order_id".into()));

        assert_eq!(contract.required.len(), 2);
        assert_eq!(contract.to_string(), "order_update:pt_BR");
    }
}
