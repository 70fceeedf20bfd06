//! Field-level validation for business input
//!
//! Every mutating operation collects its checks into a [`Validator`] before it
//! touches the record store. An invalid collector is turned into
//! [`LedgerError::FailedValidation`](crate::error::LedgerError) so callers can
//! render per-field feedback instead of a server fault.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Field name to rejection messages, in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Messages recorded for `field`, empty if none
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Collector for rejection reasons of a single operation
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` under `field` when `condition` does not hold
    pub fn check(&mut self, condition: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.add_error(field, message);
        }
        self
    }

    /// Record `message` under `field` unconditionally
    ///
    /// Repeated messages for the same field are kept once.
    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        let messages = self.errors.0.entry(field.to_string()).or_default();
        if !messages.contains(&message) {
            messages.push(message);
        }
    }

    /// Fold the errors reported by a `validator` derive into this collector
    pub fn absorb(&mut self, report: validator::ValidationErrors) {
        for (field, errors) in report.field_errors() {
            for error in errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("is invalid ({})", error.code));
                self.add_error(field, message);
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise
    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_records_only_failures() {
        let mut v = Validator::new();
        v.check(true, "amount", "must be given");
        assert!(v.is_valid());

        v.check(false, "amount", "must be given");
        assert!(!v.is_valid());
        assert_eq!(v.errors().get("amount"), ["must be given".to_string()]);
    }

    #[test]
    fn test_all_messages_for_a_field_are_kept() {
        let mut v = Validator::new();
        v.check(false, "amount", "must be given")
            .check(false, "amount", "must be positive")
            .check(false, "amount", "must be given");

        assert_eq!(
            v.errors().get("amount"),
            ["must be given".to_string(), "must be positive".to_string()]
        );
        assert_eq!(v.errors().len(), 1);
    }

    #[test]
    fn test_finish() {
        assert!(Validator::new().finish().is_ok());

        let mut v = Validator::new();
        v.add_error("account balance", "insufficient funds");
        let errors = v.finish().unwrap_err();
        assert!(errors.contains("account balance"));
        assert_eq!(errors.to_string(), "account balance: insufficient funds");
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut v = Validator::new();
        v.add_error("reason", "must be provided");
        let json = serde_json::to_value(v.errors()).unwrap();
        assert_eq!(json, serde_json::json!({ "reason": ["must be provided"] }));
    }
}
