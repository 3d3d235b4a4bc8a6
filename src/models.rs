use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = Uuid;

/// Stored user document. Only the repository and the credential store see
/// this type; everything that leaves the service goes through [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Public view of a user (no password material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: String,
    pub email: String,
}

impl From<&UserRecord> for User {
    fn from(r: &UserRecord) -> Self {
        Self { id: r.id, name: r.name.clone(), username: r.username.clone(), email: r.email.clone() }
    }
}

/// Registration payload. Every field is optional on the wire so that missing
/// fields surface as validation messages rather than JSON parse failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub content: String,
    pub username: String, // denormalized, not a reference
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Like {
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Uuid,
    pub content: String,
    pub tags: Vec<String>,
    pub img_url: Option<String>,
    pub author_id: Uuid,
    pub comments: Vec<Comment>,
    pub likes: Vec<Like>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `createPosts`; the author comes from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub img_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub tags: Vec<String>,
    pub img_url: Option<String>,
    pub author_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FollowRequest {
    pub following_id: Uuid,
}

/// Author fields embedded in post views. Email is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: String,
}

impl From<&User> for AuthorProfile {
    fn from(u: &User) -> Self {
        Self { id: u.id, name: u.name.clone(), username: u.username.clone() }
    }
}

/// A post joined with its author. `author` is `None` when the referenced
/// user no longer resolves (the store does not enforce references).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<AuthorProfile>,
}

/// Composite profile produced by the relationship aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: String,
    pub email: String,
    pub followers: Vec<User>,
    pub followings: Vec<User>,
}
