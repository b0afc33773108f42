//! Context document identity and versioning rules

use crate::types::{ContextDocument, Timestamped};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// How an update must be written to the store
#[derive(Debug, Clone, PartialEq)]
pub enum VersionDecision {
    /// Replace the document under its existing id
    InPlace(ContextDocument),
    /// Insert the document as a new version under a freshly minted id
    ///
    /// The document stored under `previous_id` is left in place. The store
    /// is responsible for flagging it `Latest = false`.
    NewVersion {
        previous_id: String,
        document: ContextDocument,
    },
}

impl VersionDecision {
    /// Document to write
    pub fn document(&self) -> &ContextDocument {
        match self {
            VersionDecision::InPlace(document) => document,
            VersionDecision::NewVersion { document, .. } => document,
        }
    }

    /// Id the document will be written under
    pub fn id(&self) -> &str {
        &self.document().id
    }

    pub fn is_new_version(&self) -> bool {
        matches!(self, VersionDecision::NewVersion { .. })
    }
}

/// Decide how an updated document is written
///
/// Either way `modified_on` is refreshed. Without a bump the id is kept and
/// the store updates in place. With a bump a new UUID is minted and the
/// document becomes the latest version.
pub fn next_version(mut document: ContextDocument, bump_requested: bool) -> VersionDecision {
    document.set_modified_on(Utc::now());

    if !bump_requested {
        debug!("In-place update of context: {}", document.id);
        return VersionDecision::InPlace(document);
    }

    let previous_id = std::mem::replace(&mut document.id, Uuid::new_v4().to_string());
    document.is_latest = Some(true);
    debug!("New context version: {} -> {}", previous_id, document.id);

    VersionDecision::NewVersion {
        previous_id,
        document,
    }
}

/// Stamp `created_on` and `modified_on` with one shared instant
pub fn stamp_created<T: Timestamped>(docs: &mut [T]) {
    let now = Utc::now();
    for doc in docs.iter_mut() {
        doc.set_created_on(now);
        doc.set_modified_on(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedbackDocument;
    use chrono::Duration;
    use std::collections::HashSet;

    fn stale_document() -> ContextDocument {
        let mut doc = ContextDocument::new("ctx-1");
        doc.content = Some("Escalate refunds over 500".to_string());
        doc.created_on = Some(Utc::now() - Duration::days(3));
        doc.modified_on = doc.created_on;
        doc.is_latest = Some(true);
        doc
    }

    #[test]
    fn test_in_place_keeps_id() {
        let original = stale_document();
        let decision = next_version(original.clone(), false);

        assert!(!decision.is_new_version());
        let updated = decision.document();
        assert_eq!(updated.id, "ctx-1");
        assert!(updated.modified_on > original.modified_on);

        // only modified_on changes
        let mut expected = original;
        expected.modified_on = updated.modified_on;
        assert_eq!(updated, &expected);
    }

    #[test]
    fn test_bump_mints_new_id() {
        let original = stale_document();
        let decision = next_version(original.clone(), true);

        match &decision {
            VersionDecision::NewVersion {
                previous_id,
                document,
            } => {
                assert_eq!(previous_id, "ctx-1");
                assert_ne!(document.id, original.id);
                assert_eq!(document.content, original.content);
                assert_eq!(document.created_on, original.created_on);
                assert!(document.modified_on > original.modified_on);
                assert_eq!(document.is_latest, Some(true));
            }
            other => panic!("expected new version, got {:?}", other),
        }
    }

    #[test]
    fn test_bump_ids_are_unique() {
        let ids: HashSet<String> = (0..100)
            .map(|_| next_version(stale_document(), true).id().to_string())
            .collect();

        assert_eq!(ids.len(), 100);
        assert!(!ids.contains("ctx-1"));
    }

    #[test]
    fn test_stamp_created_uses_one_instant() {
        let mut docs = vec![FeedbackDocument::new("f-1"), FeedbackDocument::new("f-2")];
        stamp_created(&mut docs);

        assert!(docs[0].created_on.is_some());
        assert_eq!(docs[0].created_on, docs[0].modified_on);
        assert_eq!(docs[0].created_on, docs[1].created_on);
    }
}
