use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user as reported by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
}

/// An authenticated session: the bearer token plus the user it belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

/// A caption row. The popularity counter is maintained by an external
/// aggregator over the vote table; this service never writes it.
#[derive(Debug, Clone, Serialize)]
pub struct Caption {
    pub caption_id: String,
    pub content: String,
    pub like_count: i64,
    pub image_id: Option<String>,
}

/// An image registered with the pipeline: opaque id plus its public URL.
#[derive(Debug, Clone, Serialize)]
pub struct CaptionImage {
    pub image_id: String,
    pub url: String,
}

/// A caption joined to its image, as served by the rating feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedCaption {
    pub caption_id: String,
    pub content: String,
    pub like_count: i64,
    pub image: CaptionImage,
}

/// One user's vote on one caption. At most one row exists per
/// (caption, user) pair; the store keys on that pair directly.
#[derive(Debug, Clone)]
pub struct CaptionVote {
    pub caption_id: String,
    pub profile_id: Uuid,
    pub vote_value: i8,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Upvote,
    Downvote,
}

impl VoteDirection {
    /// The signed unit value stored in the vote table.
    pub fn value(self) -> i8 {
        match self {
            VoteDirection::Upvote => 1,
            VoteDirection::Downvote => -1,
        }
    }

    pub fn from_value(value: i8) -> Option<Self> {
        match value {
            1 => Some(VoteDirection::Upvote),
            -1 => Some(VoteDirection::Downvote),
            _ => None,
        }
    }
}

/// Which of the three vote transitions actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Voted,
    Removed,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub action: VoteAction,
    pub direction: VoteDirection,
}
