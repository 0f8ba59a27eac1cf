use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use murmur_shared::types::validate_username;
use murmur_shared::GroupId;
use murmur_store::{Group, GroupMember, StoreError, User};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::{Hub, HubStats};
use crate::rate_limit::{rate_limit_middleware, EventRateLimiter, IpRateLimiter};
use crate::store::SqliteStore;
use crate::ws::chat_websocket;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub store: SqliteStore,
    pub http_limiter: IpRateLimiter,
    pub event_limiter: EventRateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(chat_websocket))
        .route("/api/online", get(online_users))
        .route("/api/users", get(list_users).post(register_user))
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/{id}/members", post(add_group_member))
        .layer(middleware::from_fn_with_state(
            state.http_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(flatten)]
    hub: HubStats,
    require_registered: bool,
}

#[derive(Serialize)]
struct OnlineResponse {
    users: Vec<String>,
}

#[derive(Deserialize)]
struct RegisterUserRequest {
    username: String,
}

#[derive(Deserialize)]
struct GroupsQuery {
    username: String,
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    name: String,
    creator: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Serialize)]
struct GroupResponse {
    #[serde(flatten)]
    group: Group,
    members: Vec<GroupMember>,
}

#[derive(Deserialize)]
struct AddMemberRequest {
    username: String,
}

#[derive(Serialize)]
struct AddMemberResponse {
    added: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        hub: state.hub.stats().await,
        require_registered: state.config.require_registered,
    })
}

async fn online_users(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        users: state.hub.online_users().await,
    })
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ServerError> {
    let users = state.store.run(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let username = validate_username(&req.username)?;

    let name = username.clone();
    let created = state
        .store
        .run(move |db| {
            if db.user_exists(&name)? {
                return Ok(None);
            }
            db.create_user(&name).map(Some)
        })
        .await?;

    match created {
        Some(user) => {
            info!(username = %user.username, "User registered");
            Ok((StatusCode::CREATED, Json(user)))
        }
        None => Err(ServerError::Conflict(format!(
            "username {username:?} is already registered"
        ))),
    }
}

async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<GroupsQuery>,
) -> Result<Json<Vec<Group>>, ServerError> {
    let username = validate_username(&query.username)?;
    let groups = state
        .store
        .run(move |db| db.list_groups_for_user(&username))
        .await?;
    Ok(Json(groups))
}

async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ServerError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ServerError::BadRequest("group name must not be empty".into()));
    }
    let creator = validate_username(&req.creator)?;
    let members = req
        .members
        .iter()
        .map(|m| validate_username(m))
        .collect::<Result<Vec<_>, _>>()?;

    let (group, members) = state
        .store
        .run(move |db| {
            let group = db.create_group(&name, &creator, &members)?;
            let members = db.list_group_members(group.id)?;
            Ok((group, members))
        })
        .await?;

    info!(group = %group.id, name = %group.name, members = members.len(), "Group created");
    Ok((StatusCode::CREATED, Json(GroupResponse { group, members })))
}

async fn add_group_member(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<AddMemberResponse>, ServerError> {
    let username = validate_username(&req.username)?;
    let group_id = GroupId(id);

    let added = state
        .store
        .run(move |db| db.add_group_member(group_id, &username))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound(format!("group {group_id}")),
            other => other.into(),
        })?;

    Ok(Json(AddMemberResponse { added }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP + WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::app_state;

    async fn call(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(app_state());
        let (status, body) = call(app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["online"], 0);
    }

    #[tokio::test]
    async fn test_register_user_conflict() {
        let state = app_state();

        let (status, body) = call(
            build_router(state.clone()),
            Method::POST,
            "/api/users",
            Some(json!({ "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "alice");

        let (status, body) = call(
            build_router(state.clone()),
            Method::POST,
            "/api/users",
            Some(json!({ "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("alice"));

        let (_, body) = call(build_router(state), Method::GET, "/api/users", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_username_rejected() {
        let (status, _) = call(
            build_router(app_state()),
            Method::POST,
            "/api/users",
            Some(json!({ "username": "a:b" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let state = app_state();

        let (status, group) = call(
            build_router(state.clone()),
            Method::POST,
            "/api/groups",
            Some(json!({ "name": "team", "creator": "alice", "members": ["bob"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(group["members"].as_array().unwrap().len(), 2);
        let id = group["id"].as_i64().unwrap();

        let (status, added) = call(
            build_router(state.clone()),
            Method::POST,
            &format!("/api/groups/{id}/members"),
            Some(json!({ "username": "carol" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(added["added"], true);

        let (_, groups) = call(
            build_router(state.clone()),
            Method::GET,
            "/api/groups?username=carol",
            None,
        )
        .await;
        assert_eq!(groups[0]["name"], "team");

        let (status, _) = call(
            build_router(state),
            Method::POST,
            "/api/groups/999/members",
            Some(json!({ "username": "carol" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_online_reflects_hub() {
        let state = app_state();
        let (conn, _rx) = state.hub.connect().await;
        state.hub.identify(conn, "alice").await.unwrap();

        let (_, body) = call(build_router(state), Method::GET, "/api/online", None).await;
        assert_eq!(body["users"], json!(["alice"]));
    }
}
