//! Knowledge entries: the question/answer corpus a tenant trains on.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::EntryId;

/// One stored knowledge item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    /// Free-form classification (serialized as `type`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Free-form provenance.
    #[serde(default)]
    pub source: String,
    /// Text used as training and query input.
    pub question: String,
    /// Text returned as prediction content.
    pub answer: String,
}

impl Entity for Entry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Untrusted entry payload as received from callers.
///
/// Nothing here is checked yet; call [`EntryDraft::validate`] before handing it
/// to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

impl EntryDraft {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            answer: Some(answer.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Check the payload and produce a typed entry, without touching storage.
    ///
    /// An id that is blank after trimming counts as absent.
    pub fn validate(&self) -> DomainResult<ValidEntry> {
        let id = match self.id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(EntryId::parse(raw).map_err(|e| DomainError::validation(e.to_string()))?),
        };

        let question = required_text("question", self.question.as_deref())?;
        let answer = required_text("answer", self.answer.as_deref())?;

        Ok(ValidEntry {
            id,
            kind: self.kind.as_deref().unwrap_or_default().trim().to_string(),
            source: self.source.as_deref().unwrap_or_default().trim().to_string(),
            question,
            answer,
        })
    }
}

fn required_text(field: &str, value: Option<&str>) -> DomainResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DomainError::validation(format!("{field} must not be empty"))),
    }
}

/// An entry payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEntry {
    pub id: Option<EntryId>,
    pub kind: String,
    pub source: String,
    pub question: String,
    pub answer: String,
}

impl ValidEntry {
    /// Materialize the stored record under `id`.
    pub fn into_entry(self, id: EntryId) -> Entry {
        Entry {
            id,
            kind: self.kind,
            source: self.source,
            question: self.question,
            answer: self.answer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_draft_is_trimmed() {
        let draft = EntryDraft::new("  hours? ", " 9-5 ")
            .with_kind("faq")
            .with_source(" import ");
        let valid = draft.validate().unwrap();
        assert_eq!(valid.id, None);
        assert_eq!(valid.question, "hours?");
        assert_eq!(valid.answer, "9-5");
        assert_eq!(valid.source, "import");
    }

    #[test]
    fn missing_question_or_answer_is_rejected() {
        let no_question = EntryDraft {
            answer: Some("x".into()),
            ..EntryDraft::default()
        };
        assert!(matches!(no_question.validate(), Err(DomainError::Validation(_))));

        let blank_answer = EntryDraft::new("q", "   ");
        match blank_answer.validate() {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("answer")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn blank_id_counts_as_absent() {
        let valid = EntryDraft::new("q", "a").with_id("  ").validate().unwrap();
        assert!(valid.id.is_none());
    }

    #[test]
    fn unsafe_id_is_a_validation_error() {
        let err = EntryDraft::new("q", "a").with_id("../etc").validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draft_deserializes_type_field() {
        let draft: EntryDraft = serde_json::from_value(serde_json::json!({
            "type": "faq",
            "question": "hours?",
            "answer": "9-5"
        }))
        .unwrap();
        assert_eq!(draft.kind.as_deref(), Some("faq"));

        let entry = draft.validate().unwrap().into_entry(EntryId::generate());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "faq");
    }
}
