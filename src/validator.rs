//! Form validation.
//!
//! Every form embeds a [`Validator`] and fills it with `check_field` calls.
//! A form is valid when no check failed; the accumulated messages are
//! rendered back next to the offending fields.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Pragmatic email shape check: a local part, `@`, and dot-separated DNS
/// labels of at most 63 characters.
pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|e| unreachable!("email pattern is valid: {e}"))
});

/// Errors accumulated while validating one form submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Validator {
    field_errors: HashMap<String, String>,
    non_field_errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field or non-field error was recorded.
    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Records `message` for `field` unless the field already has one. The
    /// first failed check per field is the one the user sees.
    pub fn add_field_error(&mut self, field: &str, message: &str) {
        self.field_errors
            .entry(field.to_owned())
            .or_insert_with(|| message.to_owned());
    }

    /// Records an error that belongs to the form as a whole.
    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_owned());
    }

    /// Records `message` for `field` when `ok` is false.
    pub fn check_field(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_field_error(field, message);
        }
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors.get(field).map(String::as_str)
    }

    pub fn field_errors(&self) -> &HashMap<String, String> {
        &self.field_errors
    }

    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }
}

/// True when `value` has something other than whitespace.
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// True when `value` has at least `n` characters. Counts characters, not
/// bytes.
pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// True when `value` has at most `n` characters.
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn permitted_value<T: PartialEq>(value: T, permitted: &[T]) -> bool {
    permitted.contains(&value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check_field(not_blank(""), "title", "This field cannot be blank");
        v.check_field(max_chars("", 100), "title", "never recorded");
        v.check_field(false, "title", "also ignored");

        assert_eq!(v.field_error("title"), Some("This field cannot be blank"));
        assert_eq!(v.field_errors().len(), 1);
        assert!(!v.is_valid());
    }

    #[test]
    fn non_field_errors_alone_make_a_form_invalid() {
        let mut v = Validator::new();
        assert!(v.is_valid());
        v.add_non_field_error("Email or password is incorrect");
        v.add_non_field_error("Email or password is incorrect");
        assert_eq!(v.non_field_errors().len(), 2);
        assert!(!v.is_valid());
    }

    #[test]
    fn whitespace_is_blank() {
        assert!(!not_blank(""));
        assert!(!not_blank(" \t\n"));
        assert!(not_blank(" x "));
    }

    #[test]
    fn char_bounds_count_characters() {
        assert!(!min_chars("pa$$", 8));
        assert!(min_chars("pa$$word", 8));
        assert!(max_chars(&"a".repeat(100), 100));
        assert!(!max_chars(&"a".repeat(101), 100));
        // Four characters, twelve bytes.
        assert!(max_chars("古池や蛙", 4));
        assert!(!min_chars("古池や蛙", 5));
    }

    #[test]
    fn permitted_values_are_exact() {
        assert!(permitted_value(7, &[1, 7, 365]));
        assert!(!permitted_value(5, &[1, 7, 365]));
        assert!(permitted_value("b", &["a", "b"]));
    }

    #[test]
    fn email_pattern() {
        assert!(matches("alice@example.com", &EMAIL_RX));
        assert!(matches("bob.o'neil+tag@mail.example.co.uk", &EMAIL_RX));
        assert!(!matches("alice@", &EMAIL_RX));
        assert!(!matches("alice.example.com", &EMAIL_RX));
        assert!(!matches("alice@-example.com", &EMAIL_RX));
        assert!(!matches("", &EMAIL_RX));
    }

    #[test]
    fn serializes_for_templates() {
        let mut v = Validator::new();
        v.add_field_error("email", "Email address is already in use");
        let json = serde_json::to_value(&v).expect("serialize");
        assert_eq!(json["field_errors"]["email"], "Email address is already in use");
        assert_eq!(json["non_field_errors"], serde_json::json!([]));
    }
}
