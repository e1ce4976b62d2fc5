use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use ghost_store::{RealtimeStore, TxDecision};
use ghost_types::{ChannelId, IdentityId};

use crate::error::CoreError;
use crate::layout::Layout;

/// Flip `identity`'s membership in a stored voter set (`{id: true, ..}`).
/// An emptied set is removed.
pub fn toggle_membership(current: Option<Value>, identity: &IdentityId) -> Option<Value> {
    let mut voters = match current {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if voters.remove(identity.as_str()).is_none() {
        voters.insert(identity.as_str().to_string(), Value::Bool(true));
    }
    if voters.is_empty() {
        None
    } else {
        Some(Value::Object(voters))
    }
}

pub struct ReactionCoordinator<S> {
    store: Arc<S>,
    layout: Layout,
}

impl<S: RealtimeStore> ReactionCoordinator<S> {
    pub fn new(store: Arc<S>, layout: Layout) -> Self {
        Self { store, layout }
    }

    /// Toggle `identity` on `emoji` for one message. Concurrent toggles by
    /// other identities are merged by the store's conditional update.
    pub async fn toggle(
        &self,
        channel: &ChannelId,
        message_id: &str,
        emoji: &str,
        identity: &IdentityId,
    ) -> Result<(), CoreError> {
        // Don't resurrect a swept message as a bare reaction subtree.
        if self
            .store
            .get(&self.layout.message(channel, message_id))
            .await?
            .is_none()
        {
            return Err(CoreError::UnknownMessage(message_id.to_string()));
        }

        let path = self.layout.reaction_voters(channel, message_id, emoji);
        let voter = identity.clone();
        let outcome = self
            .store
            .transaction(&path, move |current| {
                TxDecision::Commit(toggle_membership(current, &voter))
            })
            .await?;
        debug!(
            message = message_id,
            emoji,
            present = outcome
                .snapshot
                .as_ref()
                .and_then(|v| v.get(identity.as_str()))
                .is_some(),
            "reaction toggled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toggle_adds_then_removes() {
        let me = IdentityId::new("me");
        let added = toggle_membership(Some(json!({"other": true})), &me);
        assert_eq!(added, Some(json!({"other": true, "me": true})));
        let removed = toggle_membership(added, &me);
        assert_eq!(removed, Some(json!({"other": true})));
    }

    #[test]
    fn last_voter_leaving_clears_the_set() {
        let me = IdentityId::new("me");
        let once = toggle_membership(None, &me);
        assert_eq!(once, Some(json!({"me": true})));
        assert_eq!(toggle_membership(once, &me), None);
    }
}
