use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::aggregate;
use crate::auth::{Auth, TokenService};
use crate::cache::FeedCache;
use crate::credentials;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::*;
use crate::rate_limit::CredentialThrottle;
use crate::repo::Repo;
use crate::social::{self, FollowPolicy};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // malformed bodies get the same error shape as everything else
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                ApiError::NotFound(format!("Invalid id in path: {err}")).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .service(web::resource("/users").route(web::post().to(create_user)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            // must precede /users/{id}
            .service(web::resource("/users/search").route(web::get().to(search_users)))
            .service(web::resource("/users/{id}").route(web::get().to(get_user)))
            .service(web::resource("/follows").route(web::post().to(follow_user)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(get_all_posts))
                    .route(web::post().to(create_post)),
            )
            .service(web::resource("/posts/{id}").route(web::get().to(get_post)))
            .service(web::resource("/posts/{id}/comments").route(web::post().to(add_comment)))
            .service(web::resource("/posts/{id}/likes").route(web::post().to(add_like)))
            .default_service(web::to(route_not_found)),
    );
    cfg.route("/healthz", web::get().to(healthz));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub feed: FeedCache,
    pub tokens: TokenService,
    pub follow_policy: FollowPolicy,
    pub throttle: Option<CredentialThrottle>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, feed: FeedCache, tokens: TokenService) -> Self {
        Self { repo, feed, tokens, follow_policy: FollowPolicy::default(), throttle: None }
    }

    pub fn with_follow_policy(mut self, policy: FollowPolicy) -> Self {
        self.follow_policy = policy;
        self
    }

    pub fn with_throttle(mut self, throttle: CredentialThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }
}

/// Socket peer address. Forwarded headers are client-controlled and would
/// hand out a fresh throttle bucket per request.
fn client_addr(req: &HttpRequest) -> String {
    req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

async fn route_not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound("Route not found".into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User registered", body = MessageResponse),
        (status = 400, description = "Every validation problem, concatenated", body = ApiErrorBody),
        (status = 429, description = "Too many registrations from this address")
    )
)]
pub async fn create_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    if let Some(t) = &data.throttle {
        let addr = client_addr(&req);
        if !t.allow_register(&addr) {
            warn!(%addr, "registration throttled");
            return Err(ApiError::TooManyRequests);
        }
    }
    let message = credentials::register(data.repo.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed bearer token", body = TokenResponse),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown username"),
        (status = 429, description = "Too many attempts from this address")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(t) = &data.throttle {
        let addr = client_addr(&req);
        if !t.allow_login(&addr) {
            warn!(%addr, "login throttled");
            return Err(ApiError::TooManyRequests);
        }
    }
    let LoginRequest { username, password } = payload.into_inner();
    let token = credentials::login(data.repo.as_ref(), &data.tokens, &username, &password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Matched case-insensitively against name and username.
    pub keyword: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/users/search",
    tag = "users",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching users", body = [User]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No match, or empty keyword")
    ),
    security(("bearer" = []))
)]
pub async fn search_users(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let keyword = query.into_inner().keyword.unwrap_or_default();
    let users = data.repo.search_users(&keyword).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Profile with followers and followings", body = UserProfile),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_user(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let profile = aggregate::user_profile(data.repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    post,
    path = "/api/v1/follows",
    tag = "users",
    request_body = FollowRequest,
    responses(
        (status = 201, description = "Followed", body = MessageResponse),
        (status = 400, description = "Self-follow"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Follower or target user not found"),
        (status = 409, description = "Already following")
    ),
    security(("bearer" = []))
)]
pub async fn follow_user(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<FollowRequest>,
) -> Result<HttpResponse, ApiError> {
    let message = social::follow_user(
        data.repo.as_ref(),
        data.follow_policy,
        auth.identity().id,
        payload.following_id,
    )
    .await?;
    Ok(HttpResponse::Created().json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    tag = "posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Empty content"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Token subject no longer exists")
    ),
    security(("bearer" = []))
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let author = data.repo.get_user(auth.identity().id).await?;
    let CreatePostRequest { content, tags, img_url } = payload.into_inner();
    let post = data
        .repo
        .create_post(NewPost { content, tags: tags.unwrap_or_default(), img_url, author_id: author.id })
        .await?;
    data.feed.invalidate("post created").await;
    info!(post_id = %post.id, author_id = %post.author_id, "post created");
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    tag = "posts",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with author", body = PostView),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_post(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let view = aggregate::post_by_id(data.repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    tag = "posts",
    responses(
        (status = 200, description = "All posts, newest first", body = [PostView]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn get_all_posts(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let views = data.feed.all_posts(data.repo.as_ref()).await?;
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/comments",
    tag = "posts",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment added", body = MessageResponse),
        (status = 400, description = "Empty content"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer" = []))
)]
pub async fn add_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.add_comment(post_id, &auth.identity().username, &payload.content).await?;
    data.feed.invalidate("comment added").await;
    Ok(HttpResponse::Created().json(MessageResponse::new("Comment added successfully")))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/likes",
    tag = "posts",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 201, description = "Post liked", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Already liked")
    ),
    security(("bearer" = []))
)]
pub async fn add_like(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.add_like(post_id, &auth.identity().username).await?;
    data.feed.invalidate("like added").await;
    Ok(HttpResponse::Created().json(MessageResponse::new("Post liked successfully")))
}

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
