use crate::models::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("{0}")] Validation(String),
    #[error("storage failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Persist a new user. Fails with `Conflict` if the username or email is
    /// already taken at write time.
    async fn insert_user(&self, record: UserRecord) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// Batch fetch in the order of `ids`; ids that do not resolve are skipped.
    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>>;
    /// Credential lookup for login. This is the only read path that returns
    /// the password hash.
    async fn find_by_username(&self, username: &str) -> RepoResult<UserRecord>;
    async fn username_exists(&self, username: &str) -> RepoResult<bool>;
    async fn email_exists(&self, email: &str) -> RepoResult<bool>;
    /// Case-insensitive substring match against name OR username.
    async fn search_users(&self, keyword: &str) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Every post, newest first.
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn add_comment(&self, post_id: Id, username: &str, content: &str) -> RepoResult<()>;
    async fn add_like(&self, post_id: Id, username: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    async fn insert_follow(&self, follower_id: Id, following_id: Id) -> RepoResult<Follow>;
    /// Follow records whose `following_id` is `user_id`, oldest first.
    async fn followers_of(&self, user_id: Id) -> RepoResult<Vec<Follow>>;
    /// Follow records whose `follower_id` is `user_id`, oldest first.
    async fn followings_of(&self, user_id: Id) -> RepoResult<Vec<Follow>>;
}

pub trait Repo: UserRepo + PostRepo + FollowRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + FollowRepo {}

pub(crate) fn post_not_found() -> RepoError {
    RepoError::NotFound("Post not found".into())
}

pub(crate) fn user_not_found() -> RepoError {
    RepoError::NotFound("User not found".into())
}

// Guards are checked and applied under a single write lock in this backend.
// The trait does not promise that: a document-store implementation doing
// check-then-write in two round trips has a race window between the two.
#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    const SNAPSHOT_FILE: &str = "state.json";
    const SNAPSHOT_TMP_FILE: &str = "state.json.tmp";

    /// Three independent collections. Nothing here enforces references
    /// between them.
    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, UserRecord>,
        posts: HashMap<Id, Post>,
        follows: HashMap<Id, Follow>,
    }

    /// On-disk copy of the state. `lock` serializes writers so snapshots land
    /// one at a time; each is written to a temp file and renamed into place.
    struct Snapshot {
        path: PathBuf,
        tmp_path: PathBuf,
        lock: Mutex<()>,
    }

    impl Snapshot {
        fn write(&self, state: &RwLock<State>) {
            let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // read under the file lock so the last writer always carries the newest state
            let bytes = match state.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => {
                    log::error!("[inmem] state lock poisoned; snapshot skipped");
                    return;
                }
            };
            let bytes = match bytes {
                Ok(b) => b,
                Err(e) => {
                    log::error!("[inmem] failed to serialize snapshot: {e}");
                    return;
                }
            };
            if let Some(dir) = self.path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(&self.tmp_path, bytes) {
                log::error!("[inmem] failed to write snapshot '{}': {e}", self.tmp_path.display());
                return;
            }
            if let Err(e) = std::fs::rename(&self.tmp_path, &self.path) {
                log::error!("[inmem] failed to move snapshot into '{}': {e}", self.path.display());
            }
        }
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot: Option<Arc<Snapshot>>,
    }

    impl InMemRepo {
        /// Purely in-memory repository; nothing is written to disk.
        pub fn new() -> Self {
            Self::default()
        }

        /// Repository backed by `<data_dir>/state.json`: loaded now, rewritten
        /// after every mutation.
        pub fn with_snapshot(data_dir: impl AsRef<Path>) -> Self {
            let dir = data_dir.as_ref();
            let path = dir.join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot: Some(Arc::new(Snapshot {
                    path,
                    tmp_path: dir.join(SNAPSHOT_TMP_FILE),
                    lock: Mutex::new(()),
                })),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("[inmem] loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::error!("[inmem] failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("[inmem] no snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        /// Rewrites the snapshot on the blocking pool. Callers must not hold
        /// the state lock.
        async fn persist(&self) {
            let Some(snapshot) = self.snapshot.clone() else { return };
            let state = self.state.clone();
            if let Err(e) = actix_web::web::block(move || snapshot.write(&state)).await {
                log::error!("[inmem] snapshot task failed: {e}");
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn insert_user(&self, record: UserRecord) -> RepoResult<User> {
            let user = {
                let mut s = self.write()?;
                if s.users.values().any(|u| u.username == record.username) {
                    return Err(RepoError::Conflict("Username already taken".into()));
                }
                if s.users.values().any(|u| u.email == record.email) {
                    return Err(RepoError::Conflict("Email already registered".into()));
                }
                let user = User::from(&record);
                s.users.insert(record.id, record);
                user
            };
            self.persist().await;
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).map(User::from).ok_or_else(user_not_found)
        }

        async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
            let s = self.read()?;
            Ok(ids.iter().filter_map(|id| s.users.get(id)).map(User::from).collect())
        }

        async fn find_by_username(&self, username: &str) -> RepoResult<UserRecord> {
            let s = self.read()?;
            s.users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or_else(user_not_found)
        }

        async fn username_exists(&self, username: &str) -> RepoResult<bool> {
            let s = self.read()?;
            Ok(s.users.values().any(|u| u.username == username))
        }

        async fn email_exists(&self, email: &str) -> RepoResult<bool> {
            let s = self.read()?;
            Ok(s.users.values().any(|u| u.email == email))
        }

        async fn search_users(&self, keyword: &str) -> RepoResult<Vec<User>> {
            let needle = keyword.trim().to_lowercase();
            if needle.is_empty() {
                return Err(RepoError::NotFound("Keyword is required".into()));
            }
            let s = self.read()?;
            let mut found: Vec<User> = s
                .users
                .values()
                .filter(|u| {
                    u.username.to_lowercase().contains(&needle)
                        || u.name.as_deref().is_some_and(|n| n.to_lowercase().contains(&needle))
                })
                .map(User::from)
                .collect();
            if found.is_empty() {
                return Err(RepoError::NotFound(format!("No users match '{}'", keyword.trim())));
            }
            found.sort_by(|a, b| a.username.cmp(&b.username));
            Ok(found)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            if new.content.trim().is_empty() {
                return Err(RepoError::Validation("Content is required".into()));
            }
            let now = Utc::now();
            let post = Post {
                id: Uuid::new_v4(),
                content: new.content,
                tags: new.tags,
                img_url: new.img_url,
                author_id: new.author_id,
                comments: Vec::new(),
                likes: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            self.write()?.posts.insert(post.id, post.clone());
            self.persist().await;
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.get(&id).cloned().ok_or_else(post_not_found)
        }

        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.posts.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at)); // latest first
            Ok(v)
        }

        async fn add_comment(&self, post_id: Id, username: &str, content: &str) -> RepoResult<()> {
            let mut missing = Vec::new();
            if content.trim().is_empty() { missing.push("Content is required."); }
            if username.trim().is_empty() { missing.push("Username is required."); }
            if !missing.is_empty() {
                return Err(RepoError::Validation(missing.join(" ")));
            }
            {
                let mut s = self.write()?;
                let post = s.posts.get_mut(&post_id).ok_or_else(post_not_found)?;
                let now = Utc::now();
                post.comments.push(Comment {
                    content: content.to_string(),
                    username: username.to_string(),
                    created_at: now,
                    updated_at: now,
                });
            }
            self.persist().await;
            Ok(())
        }

        async fn add_like(&self, post_id: Id, username: &str) -> RepoResult<()> {
            {
                let mut s = self.write()?;
                let post = s.posts.get_mut(&post_id).ok_or_else(post_not_found)?;
                if post.likes.iter().any(|l| l.username == username) {
                    return Err(RepoError::Conflict("You already liked this post".into()));
                }
                let now = Utc::now();
                post.likes.push(Like { username: username.to_string(), created_at: now, updated_at: now });
            }
            self.persist().await;
            Ok(())
        }
    }

    #[async_trait]
    impl FollowRepo for InMemRepo {
        async fn insert_follow(&self, follower_id: Id, following_id: Id) -> RepoResult<Follow> {
            if follower_id == following_id {
                return Err(RepoError::Validation("You cannot follow yourself".into()));
            }
            let follow = {
                let mut s = self.write()?;
                if s.follows
                    .values()
                    .any(|f| f.follower_id == follower_id && f.following_id == following_id)
                {
                    return Err(RepoError::Conflict("You are already following this user".into()));
                }
                let now = Utc::now();
                let follow = Follow { id: Uuid::new_v4(), follower_id, following_id, created_at: now, updated_at: now };
                s.follows.insert(follow.id, follow.clone());
                follow
            };
            self.persist().await;
            Ok(follow)
        }

        async fn followers_of(&self, user_id: Id) -> RepoResult<Vec<Follow>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.follows.values().filter(|f| f.following_id == user_id).cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn followings_of(&self, user_id: Id) -> RepoResult<Vec<Follow>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.follows.values().filter(|f| f.follower_id == user_id).cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }
    }
}
