//! Core error types for AttachmentFu RS
//!
//! `ValidationErrors` is the field-level error set collected while validating
//! an attachment. Errors from thumbnails are merged into their parent's set.

use std::collections::BTreeMap;
use std::fmt;

/// Message used when a required attribute is missing
pub const BLANK: &str = "can't be blank";

/// Message used when a value falls outside its configured acceptance set
pub const NOT_INCLUDED: &str = "is not included in the list";

/// Validation errors collection
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    /// Field-specific errors: field_name -> Vec<error_messages>
    pub errors: BTreeMap<String, Vec<String>>,
    /// Base errors not tied to a specific field
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    /// Check if there are errors for a specific field
    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Get errors for a specific field
    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = self.base_errors.clone();
        for (field, field_messages) in &self.errors {
            for msg in field_messages {
                messages.push(format!("{} {}", field, msg));
            }
        }
        messages
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_query() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add("size", NOT_INCLUDED);
        errors.add("size", "is too large");

        assert!(errors.has_error("size"));
        assert!(!errors.has_error("content_type"));
        assert_eq!(errors.get("size").map(Vec::len), Some(2));
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let mut parent = ValidationErrors::new();
        parent.add("filename", BLANK);

        let mut child = ValidationErrors::new();
        child.add("filename", NOT_INCLUDED);
        child.add_base("error saving thumbnail");

        parent.merge(child);

        assert_eq!(parent.get("filename").map(Vec::len), Some(2));
        assert_eq!(parent.base_errors, vec!["error saving thumbnail"]);
    }

    #[test]
    fn test_full_messages_and_display() {
        let mut errors = ValidationErrors::new();
        errors.add_base("base problem");
        errors.add("content_type", NOT_INCLUDED);

        assert_eq!(
            errors.full_messages(),
            vec![
                "base problem".to_string(),
                "content_type is not included in the list".to_string()
            ]
        );
        assert_eq!(
            errors.to_string(),
            "base problem, content_type is not included in the list"
        );
    }
}
