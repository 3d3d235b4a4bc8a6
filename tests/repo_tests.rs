#![cfg(feature = "inmem-store")]

use linkedout::{
    aggregate,
    models::{NewPost, UserRecord},
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use linkedout::repo::{FollowRepo, PostRepo, UserRepo};
use uuid::Uuid;

/// Helper that returns a fresh, empty, non-persisting repository.
fn repo() -> InMemRepo {
    InMemRepo::new()
}

fn record(name: Option<&str>, username: &str) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        name: name.map(str::to_string),
        username: username.into(),
        email: format!("{username}@mail.com"),
        password_hash: "$2b$10$not-a-real-hash".into(),
    }
}

fn new_post(author_id: Uuid, content: &str) -> NewPost {
    NewPost { content: content.into(), tags: vec!["rust".into()], img_url: None, author_id }
}

#[tokio::test]
async fn user_insert_is_unique_on_username_and_email() {
    let r = repo();
    let alice = r.insert_user(record(Some("Alice"), "alice")).await.unwrap();
    assert_eq!(alice.username, "alice");

    let err = r.insert_user(record(None, "alice")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let mut same_email = record(None, "alice2");
    same_email.email = "alice@mail.com".into();
    let err = r.insert_user(same_email).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    assert!(r.username_exists("alice").await.unwrap());
    assert!(r.email_exists("alice@mail.com").await.unwrap());
    assert!(!r.username_exists("bob").await.unwrap());
}

#[tokio::test]
async fn get_user_unknown_id_is_not_found() {
    let r = repo();
    let err = r.get_user(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err, RepoError::NotFound("User not found".into()));
}

#[tokio::test]
async fn search_matches_name_or_username_case_insensitively() {
    let r = repo();
    r.insert_user(record(Some("Johnny Appleseed"), "apples")).await.unwrap();
    r.insert_user(record(None, "JOHNDOE")).await.unwrap();
    r.insert_user(record(Some("Carol"), "carol")).await.unwrap();

    // "john" hits one user by name and another by username
    let found = r.search_users("john").await.unwrap();
    let names: Vec<_> = found.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["JOHNDOE", "apples"]);

    // serialized results never carry password material
    let json = serde_json::to_value(&found).unwrap();
    for u in json.as_array().unwrap() {
        assert!(u.get("password").is_none());
        assert!(u.get("password_hash").is_none());
    }

    assert!(matches!(r.search_users("zzz").await, Err(RepoError::NotFound(_))));
    assert!(matches!(r.search_users("").await, Err(RepoError::NotFound(_))));
    assert!(matches!(r.search_users("   ").await, Err(RepoError::NotFound(_))));
}

#[tokio::test]
async fn search_treats_keyword_literally() {
    let r = repo();
    r.insert_user(record(None, "dot.user")).await.unwrap();
    r.insert_user(record(None, "dotxuser")).await.unwrap();
    let found = r.search_users("t.u").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "dot.user");
}

#[tokio::test]
async fn create_post_requires_content() {
    let r = repo();
    let err = r.create_post(new_post(Uuid::new_v4(), "   ")).await.unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let p = r.create_post(new_post(Uuid::new_v4(), "hello")).await.unwrap();
    assert!(p.comments.is_empty());
    assert!(p.likes.is_empty());
    assert_eq!(p.created_at, p.updated_at);
}

#[tokio::test]
async fn list_posts_newest_first() {
    let r = repo();
    let author = Uuid::new_v4();
    for c in ["first", "second", "third"] {
        r.create_post(new_post(author, c)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    let contents: Vec<_> = r.list_posts().await.unwrap().into_iter().map(|p| p.content).collect();
    assert_eq!(contents, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn like_guard_counts_once() {
    let r = repo();
    let post = r.create_post(new_post(Uuid::new_v4(), "likeable")).await.unwrap();

    r.add_like(post.id, "alice").await.unwrap();
    let err = r.add_like(post.id, "alice").await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
    r.add_like(post.id, "bob").await.unwrap();

    let likes = r.get_post(post.id).await.unwrap().likes;
    assert_eq!(likes.len(), 2);
    assert_eq!(likes.iter().filter(|l| l.username == "alice").count(), 1);

    let err = r.add_like(Uuid::new_v4(), "alice").await.unwrap_err();
    assert_eq!(err, RepoError::NotFound("Post not found".into()));
}

#[tokio::test]
async fn comments_append_and_validate() {
    let r = repo();
    let post = r.create_post(new_post(Uuid::new_v4(), "talk to me")).await.unwrap();

    r.add_comment(post.id, "alice", "first!").await.unwrap();
    r.add_comment(post.id, "bob", "second").await.unwrap();
    let comments = r.get_post(post.id).await.unwrap().comments;
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].username, "alice");
    assert_eq!(comments[1].content, "second");

    let err = r.add_comment(post.id, "", "").await.unwrap_err();
    assert_eq!(err, RepoError::Validation("Content is required. Username is required.".into()));

    let err = r.add_comment(Uuid::new_v4(), "alice", "hello?").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[tokio::test]
async fn follow_guards() {
    let r = repo();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    r.insert_follow(a, b).await.unwrap();
    assert!(matches!(r.insert_follow(a, b).await, Err(RepoError::Conflict(_))));
    // the reverse direction is a different pair
    r.insert_follow(b, a).await.unwrap();
    assert!(matches!(r.insert_follow(a, a).await, Err(RepoError::Validation(_))));

    assert_eq!(r.followers_of(b).await.unwrap().len(), 1);
    assert_eq!(r.followings_of(a).await.unwrap().len(), 1);
}

#[tokio::test]
async fn profile_aggregates_both_directions() {
    let r = repo();
    let a = r.insert_user(record(Some("A"), "a")).await.unwrap();
    let b = r.insert_user(record(Some("B"), "b")).await.unwrap();
    let c = r.insert_user(record(Some("C"), "c")).await.unwrap();
    r.insert_follow(a.id, b.id).await.unwrap();

    let pb = aggregate::user_profile(&r, b.id).await.unwrap();
    assert_eq!(pb.followers.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a.id]);
    assert!(pb.followings.is_empty());

    let pa = aggregate::user_profile(&r, a.id).await.unwrap();
    assert_eq!(pa.followings.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b.id]);
    assert!(pa.followers.is_empty());

    let pc = aggregate::user_profile(&r, c.id).await.unwrap();
    assert!(pc.followers.is_empty() && pc.followings.is_empty());

    assert!(matches!(aggregate::user_profile(&r, Uuid::new_v4()).await, Err(RepoError::NotFound(_))));
}

#[tokio::test]
async fn post_views_carry_public_author_fields_only() {
    let r = repo();
    let author = r.insert_user(record(Some("Alice"), "alice")).await.unwrap();
    r.create_post(new_post(author.id, "mine")).await.unwrap();
    r.create_post(new_post(Uuid::new_v4(), "orphan")).await.unwrap();

    let views = aggregate::all_posts(&r).await.unwrap();
    assert_eq!(views.len(), 2);
    let mine = views.iter().find(|v| v.post.content == "mine").unwrap();
    assert_eq!(mine.author.as_ref().unwrap().username, "alice");
    let orphan = views.iter().find(|v| v.post.content == "orphan").unwrap();
    assert!(orphan.author.is_none());

    let json = serde_json::to_value(mine).unwrap();
    assert_eq!(json["content"], "mine");
    assert!(json["author"].get("email").is_none());
    assert!(json["author"].get("password_hash").is_none());
}

#[tokio::test]
async fn snapshot_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (user_id, post_id) = {
        let r = InMemRepo::with_snapshot(dir.path());
        let u = r.insert_user(record(Some("Alice"), "alice")).await.unwrap();
        let p = r.create_post(new_post(u.id, "persisted")).await.unwrap();
        r.add_like(p.id, "alice").await.unwrap();
        (u.id, p.id)
    };
    assert!(dir.path().join("state.json").exists());

    let reloaded = InMemRepo::with_snapshot(dir.path());
    assert_eq!(reloaded.get_user(user_id).await.unwrap().username, "alice");
    // the credential record, hash included, survives too
    assert!(reloaded.find_by_username("alice").await.unwrap().password_hash.starts_with("$2b$"));
    assert_eq!(reloaded.get_post(post_id).await.unwrap().likes.len(), 1);
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), b"{not json").unwrap();
    let r = InMemRepo::with_snapshot(dir.path());
    assert!(r.list_posts().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_leave_a_complete_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot(dir.path());
    let author = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..32 {
        let r = r.clone();
        handles.push(tokio::spawn(async move {
            r.create_post(new_post(author, &format!("post {i}"))).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let reloaded = InMemRepo::with_snapshot(dir.path());
    assert_eq!(reloaded.list_posts().await.unwrap().len(), 32);
    assert!(!dir.path().join("state.json.tmp").exists());
}
