//! Call sites for the post operations.

use serde::{Deserialize, Serialize};

use super::{settle, CallOutcome, NoParams, Payload};
use crate::bridge::{Bridge, Envelope, Operation};

/// A backend-owned record. Callers never mutate posts locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    pub id: i32,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePostRequest {
    pub id: i32,
}

// ─── Operations ──────────────────────────────────────────────────────────────

pub struct GetAllPosts;

impl Operation for GetAllPosts {
    const NAME: &'static str = "get_all_posts";
    type Params = NoParams;
    type Output = Envelope<Vec<Post>>;
}

pub struct CreatePost;

impl Operation for CreatePost {
    const NAME: &'static str = "create_post";
    type Params = Payload<CreatePostRequest>;
    type Output = Envelope<Post>;
}

pub struct UpdatePost;

impl Operation for UpdatePost {
    const NAME: &'static str = "update_post";
    type Params = Payload<UpdatePostRequest>;
    type Output = Envelope<Post>;
}

pub struct DeletePost;

impl Operation for DeletePost {
    const NAME: &'static str = "delete_post";
    type Params = Payload<DeletePostRequest>;
    type Output = Envelope<()>;
}

// ─── Call Sites ──────────────────────────────────────────────────────────────

/// Fetch every post, ordered by id.
pub async fn get_all_posts(bridge: &Bridge) -> CallOutcome<Vec<Post>> {
    let outcome = settle(GetAllPosts::NAME, bridge.call::<GetAllPosts>(&NoParams {}).await);
    if let CallOutcome::Completed(Some(posts)) = &outcome {
        tracing::info!(count = posts.len(), "fetched posts");
    }
    outcome
}

pub async fn create_post(bridge: &Bridge, title: &str, text: &str) -> CallOutcome<Post> {
    let params = Payload {
        payload: CreatePostRequest {
            title: title.to_string(),
            text: text.to_string(),
        },
    };
    settle(CreatePost::NAME, bridge.call::<CreatePost>(&params).await)
}

pub async fn update_post(bridge: &Bridge, id: i32, title: &str, text: &str) -> CallOutcome<Post> {
    let params = Payload {
        payload: UpdatePostRequest {
            id,
            title: title.to_string(),
            text: text.to_string(),
        },
    };
    settle(UpdatePost::NAME, bridge.call::<UpdatePost>(&params).await)
}

pub async fn delete_post(bridge: &Bridge, id: i32) -> CallOutcome<()> {
    let params = Payload {
        payload: DeletePostRequest { id },
    };
    settle(DeletePost::NAME, bridge.call::<DeletePost>(&params).await)
}
