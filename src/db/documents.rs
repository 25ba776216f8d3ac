//! In-memory store of `IngestedDocument` records (§3).
//!
//! Grounded on `types::PartyRegistry`'s `RwLock<HashMap<..>>` shape: the
//! core owns Document lifecycle (created on ingestion, replaced on
//! re-ingestion, destroyed on admin action) the same way it keeps parties
//! in memory rather than behind a full relational schema.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::IngestedDocument;

/// Thread-safe document registry, keyed by the document's external id.
#[derive(Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<String, IngestedDocument>>,
}

impl DocumentStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document record (re-ingestion upserts by id).
    pub fn upsert(&self, document: IngestedDocument) {
        self.documents.write().insert(document.id.clone(), document);
    }

    /// Look up a document by id.
    pub fn get(&self, id: &str) -> Option<IngestedDocument> {
        self.documents.read().get(id).cloned()
    }

    /// Remove a document record.
    pub fn remove(&self, id: &str) -> Option<IngestedDocument> {
        self.documents.write().remove(id)
    }

    /// List all documents, optionally filtered by party.
    pub fn list(&self, party_id: Option<&str>) -> Vec<IngestedDocument> {
        self.documents
            .read()
            .values()
            .filter(|d| party_id.map(|p| d.party_id == p).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Count documents for one party.
    pub fn count_for_party(&self, party_id: &str) -> usize {
        self.documents.read().values().filter(|d| d.party_id == party_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, party: &str) -> IngestedDocument {
        IngestedDocument {
            id: id.to_string(),
            party_id: party.to_string(),
            source_url: "https://example.test/plan.pdf".to_string(),
            local_path: "/tmp/plan.pdf".to_string(),
            page_count: 1,
            byte_size: 10,
            downloaded_at: Utc::now(),
            parsed_at: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = DocumentStore::new();
        store.upsert(doc("d1", "pln"));
        assert!(store.get("d1").is_some());
    }

    #[test]
    fn reingestion_replaces_existing_record() {
        let store = DocumentStore::new();
        store.upsert(doc("d1", "pln"));
        let mut replacement = doc("d1", "pln");
        replacement.page_count = 42;
        store.upsert(replacement);
        assert_eq!(store.get("d1").unwrap().page_count, 42);
        assert_eq!(store.list(None).len(), 1);
    }

    #[test]
    fn list_filters_by_party() {
        let store = DocumentStore::new();
        store.upsert(doc("d1", "pln"));
        store.upsert(doc("d2", "pusc"));
        assert_eq!(store.list(Some("pln")).len(), 1);
        assert_eq!(store.count_for_party("pusc"), 1);
    }
}
