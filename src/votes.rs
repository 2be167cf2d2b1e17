use crate::{
    domain::VoteStore,
    errors::VoteError,
    models::{CaptionVote, User, VoteAction, VoteDirection, VoteOutcome},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Applies one of three mutually exclusive vote transitions for the current
/// user: insert on first vote, delete on a repeated vote (toggle-off), value
/// flip when the direction changes.
///
/// The store keys votes on (caption, user) and applies every mutation as a
/// conditional write, so a concurrent vote from another tab surfaces as a
/// conflict instead of a duplicate row or a lost update.
pub struct VoteRecorder {
    store: Arc<dyn VoteStore>,
}

impl VoteRecorder {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    pub async fn vote(
        &self,
        user: Option<&User>,
        caption_id: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        let user = user.ok_or(VoteError::NotLoggedIn)?;

        let existing = self.store.find_vote(caption_id, user.id).await?;
        let new_value = direction.value();

        let outcome = match existing {
            None => {
                let now = Utc::now();
                let vote = CaptionVote {
                    caption_id: caption_id.to_string(),
                    profile_id: user.id,
                    vote_value: new_value,
                    created_at: now,
                    modified_at: now,
                };
                self.store.insert_vote(&vote).await?;
                VoteOutcome {
                    action: VoteAction::Voted,
                    direction,
                }
            }
            // Same vote again: remove it (toggle off).
            Some(existing) if existing.vote_value == new_value => {
                self.store
                    .delete_vote(caption_id, user.id, existing.vote_value)
                    .await?;
                VoteOutcome {
                    action: VoteAction::Removed,
                    direction,
                }
            }
            // Different vote: flip the value.
            Some(existing) => {
                self.store
                    .update_vote(
                        caption_id,
                        user.id,
                        existing.vote_value,
                        new_value,
                        Utc::now(),
                    )
                    .await?;
                VoteOutcome {
                    action: VoteAction::Changed,
                    direction,
                }
            }
        };

        tracing::debug!(
            caption_id,
            profile_id = %user.id,
            action = ?outcome.action,
            "vote recorded"
        );
        Ok(outcome)
    }

    /// The current user's vote direction on a caption, if any. Logged-out
    /// callers simply see no vote.
    pub async fn current_vote(
        &self,
        user: Option<&User>,
        caption_id: &str,
    ) -> Result<Option<VoteDirection>, VoteError> {
        let Some(user) = user else {
            return Ok(None);
        };

        let existing = self.store.find_vote(caption_id, user.id).await?;
        Ok(existing.and_then(|v| VoteDirection::from_value(v.vote_value)))
    }
}
