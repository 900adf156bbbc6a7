//! Versioned documents for persisted session state.
//!
//! Encoding only; reading and writing the bytes is done by the engine through
//! the filesystem port.

use serde::{Deserialize, Serialize};

use crate::domain::{
    AuthenticatedUser, ModCollection, ModCollectionEntry, ModId, UserSubscriptionList,
};
use crate::error::{ModError, ModResult};

/// Current document version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Contents of `state.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    #[serde(default)]
    pub mods: Vec<ModCollectionEntry>,
}

impl StateDocument {
    /// Snapshot `collection` in its persisted form.
    pub fn from_collection(collection: &ModCollection) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            mods: collection.iter().map(ModCollectionEntry::to_persisted).collect(),
        }
    }

    pub fn into_collection(self) -> ModCollection {
        self.mods
            .into_iter()
            .filter(|e| e.id().is_valid())
            .collect()
    }

    pub fn encode(&self) -> ModResult<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> ModResult<Self> {
        let doc: Self = decode(bytes)?;
        check_version(doc.version)?;
        Ok(doc)
    }
}

/// Contents of `user.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataDocument {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthenticatedUser>,
    #[serde(default)]
    pub subscriptions: UserSubscriptionList,
    #[serde(default)]
    pub deferred_unsubscriptions: Vec<ModId>,
}

impl Default for UserDataDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            user: None,
            subscriptions: UserSubscriptionList::default(),
            deferred_unsubscriptions: Vec::new(),
        }
    }
}

impl UserDataDocument {
    pub fn encode(&self) -> ModResult<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> ModResult<Self> {
        let doc: Self = decode(bytes)?;
        check_version(doc.version)?;
        Ok(doc)
    }
}

fn encode<T: Serialize>(value: &T) -> ModResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| ModError::invalid_response(format!("failed to encode document: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ModResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ModError::invalid_response(format!("malformed document: {e}")))
}

fn check_version(version: u32) -> ModResult<()> {
    if version == 0 || version > DOCUMENT_VERSION {
        return Err(ModError::invalid_response(format!(
            "unsupported document version {version}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModInfo, ModState, UserId};

    #[test]
    fn test_in_flight_entries_persist_as_pending() {
        let mut collection = ModCollection::new();
        let entry = collection.add_or_update_mod(ModInfo::new(ModId::new(5), "five"), "/m/5");
        entry.add_local_subscription(UserId::new(1));
        entry.begin_transaction();
        entry.set_state(ModState::Downloading);

        let doc = StateDocument::from_collection(&collection);
        let bytes = doc.encode().unwrap();
        let restored = StateDocument::decode(&bytes).unwrap().into_collection();

        let e = restored.get(ModId::new(5)).unwrap();
        assert_eq!(e.state(), ModState::InstallationPending);
        assert_eq!(e.local_subscription_count(), 1);
    }

    #[test]
    fn test_entry_errors_survive_round_trip() {
        let mut collection = ModCollection::new();
        let io = ModError::io("PermissionDenied", "mods folder is read-only");
        let missing = ModError::not_found("mod 6 was removed");
        collection
            .add_or_update_mod(ModInfo::new(ModId::new(5), "five"), "/m/5")
            .set_last_error(io.clone(), std::time::Instant::now());
        collection
            .add_or_update_mod(ModInfo::new(ModId::new(6), "six"), "/m/6")
            .set_last_error(missing.clone(), std::time::Instant::now());

        let bytes = StateDocument::from_collection(&collection).encode().unwrap();
        let restored = StateDocument::decode(&bytes).unwrap().into_collection();

        assert_eq!(restored.get(ModId::new(5)).unwrap().last_error(), Some(&io));
        let six = restored.get(ModId::new(6)).unwrap();
        assert_eq!(six.last_error(), Some(&missing));
        assert_eq!(six.retry().never_retry_reason(), Some(&missing));
    }

    #[test]
    fn test_document_shape() {
        let doc = StateDocument::from_collection(&ModCollection::new());
        let json: serde_json::Value = serde_json::from_slice(&doc.encode().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json["mods"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_future_version() {
        let err = StateDocument::decode(br#"{"version": 9, "mods": []}"#).unwrap_err();
        assert!(matches!(err, ModError::InvalidResponse { .. }));
    }

    #[test]
    fn test_user_document_round_trip() {
        let mut doc = UserDataDocument::default();
        doc.subscriptions.add(ModId::new(3));
        doc.deferred_unsubscriptions.push(ModId::new(4));

        let decoded = UserDataDocument::decode(&doc.encode().unwrap()).unwrap();
        assert_eq!(decoded, doc);
    }
}
