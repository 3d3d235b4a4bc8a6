use tracing::info;

use crate::error::ApiError;
use crate::models::Id;
use crate::repo::{Repo, RepoError};

pub const FOLLOWED: &str = "User followed successfully";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FollowPolicy {
    /// Reject follows whose target id does not resolve to a user.
    pub require_existing_target: bool,
}

impl Default for FollowPolicy {
    fn default() -> Self {
        Self { require_existing_target: true }
    }
}

/// `followUser`. Self-follow is rejected before anything else so it fails
/// the same way regardless of stored state. The follower must still exist;
/// a token can outlive its account.
pub async fn follow_user(repo: &dyn Repo, policy: FollowPolicy, follower_id: Id, following_id: Id) -> Result<String, ApiError> {
    if follower_id == following_id {
        return Err(ApiError::Validation("You cannot follow yourself".into()));
    }
    repo.get_user(follower_id).await?;
    if policy.require_existing_target {
        repo.get_user(following_id).await.map_err(|e| match e {
            RepoError::NotFound(_) => ApiError::NotFound("User to follow not found".into()),
            other => other.into(),
        })?;
    }
    let follow = repo.insert_follow(follower_id, following_id).await?;
    info!(follow_id = %follow.id, %follower_id, %following_id, "user followed");
    Ok(FOLLOWED.to_string())
}
