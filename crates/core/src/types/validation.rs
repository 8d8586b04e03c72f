//! Submission validation.
//!
//! A submitted document must be a JSON object carrying a non-blank value for
//! every field in [`REQUIRED_FIELDS`]. Validation works on the raw JSON so a
//! document that is accepted here is queued byte-for-byte as it was received.

use serde_json::Value;

use super::id::{IdError, OrderUid};

/// Field paths that must be present and non-blank in every submission.
pub const REQUIRED_FIELDS: &[&[&str]] = &[
    &["order_uid"],
    &["track_number"],
    &["payment", "transaction"],
    &["delivery", "name"],
    &["delivery", "address"],
];

/// Errors that can occur when validating a submitted order document.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The body is JSON but not an object.
    #[error("order document must be a JSON object")]
    NotAnObject,
    /// A required field is absent, not a string, or blank.
    #[error("{0} required")]
    MissingField(String),
    /// A required field is present but not a valid identifier.
    #[error("{field}: {source}")]
    InvalidField {
        field: String,
        #[source]
        source: IdError,
    },
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The order id extracted from the document.
    pub order_uid: OrderUid,
    /// The parsed document.
    pub document: Value,
}

/// Validate a raw submission body.
///
/// # Errors
///
/// Returns [`ValidationError`] if the body is not a JSON object, any
/// required field is missing or blank, or `order_uid` is too long.
pub fn validate_submission(body: &[u8]) -> Result<Submission, ValidationError> {
    let document: Value =
        serde_json::from_slice(body).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

    if !document.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    for path in REQUIRED_FIELDS {
        if string_at(&document, path).is_none() {
            return Err(ValidationError::MissingField(path.join(".")));
        }
    }

    let raw_uid = string_at(&document, &["order_uid"])
        .ok_or_else(|| ValidationError::MissingField("order_uid".to_owned()))?;
    let order_uid = OrderUid::parse(raw_uid).map_err(|source| ValidationError::InvalidField {
        field: "order_uid".to_owned(),
        source,
    })?;

    Ok(Submission {
        order_uid,
        document,
    })
}

/// Extract the `order_uid` of a document, if present and non-blank.
#[must_use]
pub fn extract_order_uid(document: &Value) -> Option<OrderUid> {
    string_at(document, &["order_uid"]).and_then(|s| OrderUid::parse(s).ok())
}

/// Follow `path` through nested objects and return a non-blank string leaf.
fn string_at<'a>(document: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(document, |node, key| node.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
