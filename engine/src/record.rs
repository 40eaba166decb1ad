//! Record abstraction shared by every data kind.
//!
//! A [`SyncRecord`] is the per-kind merge configuration: it names the kind,
//! how two records are recognised as the same logical entity, and how the
//! record maps onto a remote [`Document`] and onto the local storage text.

use crate::{error::Result, DataKind, Error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Which copy a record was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The on-device copy
    Local,
    /// The remote document store
    Remote,
}

/// A remote document: store-assigned (or keyed) id plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A record kind that takes part in reconciliation.
///
/// Records are immutable values once created; an update is a removal
/// followed by an insert.
pub trait SyncRecord:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The collection this record type belongs to.
    const KIND: DataKind;

    /// Identity key used to match a local record against a remote one.
    type Key: Eq + Clone + fmt::Debug;

    fn identity_key(&self) -> Self::Key;

    /// Whether two records represent the same logical entity.
    ///
    /// Defaults to identity key equality. Kinds with fallback matching
    /// rules override this.
    fn is_equivalent(&self, other: &Self) -> bool {
        self.identity_key() == other.identity_key()
    }

    /// Check field-level constraints before a record is stored.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Remote document id for keyed kinds; `None` lets the store generate one.
    fn document_id(&self) -> Option<String> {
        None
    }

    /// Decode a record from a remote document.
    fn from_document(doc: &Document) -> Result<Self> {
        serde_json::from_value(doc.data.clone()).map_err(|e| Error::MalformedDocument {
            kind: Self::KIND,
            id: doc.id.clone(),
            reason: e.to_string(),
        })
    }

    /// JSON body written to the remote store.
    fn to_document_data(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::encode(Self::KIND, e))
    }

    /// Serialize a whole local collection to storage text.
    fn encode_local(records: &[Self]) -> Result<String> {
        serde_json::to_string(records).map_err(|e| Error::encode(Self::KIND, e))
    }

    /// Parse storage text back into a local collection.
    fn decode_local(text: &str) -> Result<Vec<Self>> {
        serde_json::from_str(text).map_err(|e| Error::MalformedCollection {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }
}

/// Decode a remote snapshot, collecting undecodable documents separately.
pub fn decode_documents<R: SyncRecord>(docs: &[Document]) -> (Vec<R>, Vec<Error>) {
    let mut records = Vec::with_capacity(docs.len());
    let mut errors = Vec::new();
    for doc in docs {
        match R::from_document(doc) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(e),
        }
    }
    (records, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Sender, ChatMessage, WorkoutLogEntry};
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn decode_documents_skips_malformed() {
        let docs = vec![
            Document::new(
                "a",
                json!({"exercise": "Squats", "reps": 12, "date": "2024-01-02"}),
            ),
            Document::new("b", json!({"exercise": "Squats", "reps": "twelve"})),
        ];

        let (records, errors) = decode_documents::<WorkoutLogEntry>(&docs);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            Error::MalformedDocument { id, .. } if id == "b"
        ));
    }

    #[test]
    fn union_records_have_no_document_id() {
        let msg = ChatMessage::new("1", "hello", Sender::User);
        assert_eq!(msg.document_id(), None);
    }

    #[test]
    fn decode_local_reports_malformed_text() {
        let err = WorkoutLogEntry::decode_local("{not json").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedCollection {
                kind: DataKind::WorkoutLogs,
                ..
            }
        ));
    }
}
