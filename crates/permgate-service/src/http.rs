//! HTTP surface
//!
//! Six mutation routes plus a health check. Handlers only translate the
//! request into a [`RightsMutation`] and an [`AuthContext`]; everything
//! else happens in [`MutationService::apply`].

use crate::mutation::{MutationError, MutationService};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, put};
use axum::{Json, Router};
use permgate_authorization::{AuthContext, TokenError};
use permgate_core::{Command, GroupName, Principal, ResourceRef, Right, RightsMutation, UserId};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

type Shared = State<Arc<MutationService>>;
type Reply = Result<Json<Value>, MutationError>;

/// Build the router over `service`
pub fn router(service: Arc<MutationService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/user/:user/:kind/:resource/:right", put(set_user_right))
        .route(
            "/user/:user/:kind/:resource",
            put(clear_user_right).delete(delete_user_right),
        )
        .route("/group/:group/:kind/:resource/:right", put(set_group_right))
        .route(
            "/group/:group/:kind/:resource",
            put(clear_group_right).delete(delete_group_right),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

/// Serve `service` on `listener` until `shutdown` resolves; in-flight
/// requests are allowed to finish
pub async fn serve(
    listener: TcpListener,
    service: Arc<MutationService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn caller(headers: &HeaderMap) -> Result<AuthContext, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::Malformed {
            message: "authorization header is not visible ASCII".to_string(),
        })?;
    AuthContext::from_authorization_header(value)
}

async fn apply(
    service: &MutationService,
    headers: &HeaderMap,
    command: Command,
    principal: Principal,
    resource: ResourceRef,
    right: Right,
) -> Reply {
    let ctx = caller(headers)?;
    let mutation = RightsMutation {
        command,
        resource,
        principal,
        right,
    };
    service.apply(&ctx, mutation).await?;
    Ok(Json(json!({ "status": "ok" })))
}

fn user(name: String) -> Result<Principal, MutationError> {
    Ok(Principal::User(UserId::parse(name)?))
}

fn group(name: String) -> Result<Principal, MutationError> {
    Ok(Principal::Group(GroupName::parse(name)?))
}

async fn set_user_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource, value)): Path<(String, String, String, String)>,
) -> Reply {
    let principal = user(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Put, principal, resource, Right::new(value)).await
}

async fn clear_user_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource)): Path<(String, String, String)>,
) -> Reply {
    let principal = user(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Put, principal, resource, Right::empty()).await
}

async fn delete_user_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource)): Path<(String, String, String)>,
) -> Reply {
    let principal = user(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Delete, principal, resource, Right::empty()).await
}

async fn set_group_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource, value)): Path<(String, String, String, String)>,
) -> Reply {
    let principal = group(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Put, principal, resource, Right::new(value)).await
}

async fn clear_group_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource)): Path<(String, String, String)>,
) -> Reply {
    let principal = group(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Put, principal, resource, Right::empty()).await
}

async fn delete_group_right(
    State(service): Shared,
    headers: HeaderMap,
    Path((name, kind, resource)): Path<(String, String, String)>,
) -> Reply {
    let principal = group(name)?;
    let resource = ResourceRef::parse(kind, resource)?;
    apply(&service, &headers, Command::Delete, principal, resource, Right::empty()).await
}
