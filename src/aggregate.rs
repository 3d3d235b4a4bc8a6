//! Read-time joins across the independently stored collections.
//!
//! Each view is assembled in explicit steps: fetch the base entity, collect
//! the related ids, batch-fetch the related users, then build the view.

use std::collections::{HashMap, HashSet};

use crate::models::{AuthorProfile, Id, Post, PostView, User, UserProfile};
use crate::repo::{Repo, RepoResult};

/// `getUser`: the user plus everyone following them and everyone they follow.
pub async fn user_profile(repo: &dyn Repo, id: Id) -> RepoResult<UserProfile> {
    let user = repo.get_user(id).await?;

    let follower_ids: Vec<Id> = repo.followers_of(id).await?.iter().map(|f| f.follower_id).collect();
    let following_ids: Vec<Id> = repo.followings_of(id).await?.iter().map(|f| f.following_id).collect();

    let followers = repo.get_users(&follower_ids).await?;
    let followings = repo.get_users(&following_ids).await?;

    Ok(UserProfile {
        id: user.id,
        name: user.name,
        username: user.username,
        email: user.email,
        followers,
        followings,
    })
}

/// Join posts with their authors, preserving the input order.
pub async fn with_authors(repo: &dyn Repo, posts: Vec<Post>) -> RepoResult<Vec<PostView>> {
    let mut seen = HashSet::new();
    let author_ids: Vec<Id> = posts.iter().map(|p| p.author_id).filter(|id| seen.insert(*id)).collect();
    let authors: HashMap<Id, AuthorProfile> = repo
        .get_users(&author_ids)
        .await?
        .iter()
        .map(|u: &User| (u.id, AuthorProfile::from(u)))
        .collect();

    Ok(posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned();
            PostView { post, author }
        })
        .collect())
}

/// `getAllPost` (uncached): every post, newest first, author-enriched.
pub async fn all_posts(repo: &dyn Repo) -> RepoResult<Vec<PostView>> {
    let posts = repo.list_posts().await?;
    with_authors(repo, posts).await
}

/// `getPost`.
pub async fn post_by_id(repo: &dyn Repo, id: Id) -> RepoResult<PostView> {
    let post = repo.get_post(id).await?;
    let mut views = with_authors(repo, vec![post]).await?;
    views.pop().ok_or_else(crate::repo::post_not_found)
}
