//! Per-screen view state. Each view owns its selection and derived caches and
//! reaches the stores only through the collaborator traits.

pub mod attainment;
pub mod exam_config;
pub mod marks_entry;

use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::model::{Subject, User};
use crate::store::{DirectoryStore, StoreError};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ViewError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ViewError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn validation(fields: FieldErrors) -> Self {
        ViewError::new("validation_failed", "exam has invalid fields")
            .with_details(json!({ "fields": fields }))
    }
}

impl From<StoreError> for ViewError {
    fn from(e: StoreError) -> Self {
        let details = e.table().map(|t| json!({ "table": t }));
        ViewError {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<CalcError> for ViewError {
    fn from(e: CalcError) -> Self {
        ViewError {
            code: "bad_params",
            message: e.message,
            details: e.details,
        }
    }
}

/// Field path (`name`, `questions[2].maxMarks`) to message.
pub type FieldErrors = BTreeMap<String, String>;

/// Subject lookup shared by every view: unknown subjects are `not_found`,
/// subjects taught by someone else are `forbidden`.
pub fn owned_subject<S: DirectoryStore + ?Sized>(
    store: &S,
    owner: &User,
    subject_id: &str,
) -> Result<Subject, ViewError> {
    match store.subject(subject_id)? {
        None => Err(ViewError::new("not_found", "subject not found")
            .with_details(json!({ "subjectId": subject_id }))),
        Some(s) if s.instructor_id != owner.id => Err(ViewError::new(
            "forbidden",
            "subject belongs to another instructor",
        )
        .with_details(json!({ "subjectId": subject_id }))),
        Some(s) => Ok(s),
    }
}
