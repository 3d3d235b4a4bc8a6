use crate::error::ApiErrorBody;
use crate::models::{
    AuthorProfile, Comment, CreatePostRequest, FollowRequest, Like, LoginRequest, MessageResponse,
    NewComment, NewUser, Post, PostView, TokenResponse, User, UserProfile,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_user,
        crate::routes::login,
        crate::routes::search_users,
        crate::routes::get_user,
        crate::routes::follow_user,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::get_all_posts,
        crate::routes::add_comment,
        crate::routes::add_like,
    ),
    components(schemas(
        User, NewUser, LoginRequest, TokenResponse, MessageResponse, UserProfile,
        Post, PostView, AuthorProfile, Comment, Like, CreatePostRequest, NewComment,
        FollowRequest, ApiErrorBody
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "users", description = "Registration, login, search and profiles"),
        (name = "posts", description = "Posts, comments and likes"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
