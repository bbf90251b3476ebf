use crate::store::models::{Ticket, TicketStatus};
use crate::store::repo::{ChildEntity, Entity};
use crate::store::{DbPool, Repository, StoreError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid ID")]
    InvalidId,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(label) => Self::NotFound(label),
            StoreError::Validation(message) => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidId | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(message) => {
                error!(error = %message, "ошибка обработки запроса");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(self.to_string())).into_response()
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::InvalidId)
}

pub async fn list<E: Entity>(State(db): State<DbPool>) -> Result<Json<Vec<E>>, ApiError> {
    Ok(Json(Repository::<E>::new(db).list().await?))
}

pub async fn get_one<E: Entity>(
    State(db): State<DbPool>,
    Path(id): Path<String>,
) -> Result<Json<E>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(Repository::<E>::new(db).get(id).await?))
}

pub async fn create<E: Entity>(
    State(db): State<DbPool>,
    body: Result<Json<E>, JsonRejection>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    let Json(entity) = body?;
    let created = Repository::<E>::new(db).create(entity).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<E: Entity>(
    State(db): State<DbPool>,
    Path(id): Path<String>,
    body: Result<Json<E>, JsonRejection>,
) -> Result<Json<E>, ApiError> {
    let id = parse_id(&id)?;
    let Json(mut entity) = body?;
    entity.set_key(id);
    Ok(Json(Repository::<E>::new(db).update(entity).await?))
}

pub async fn delete<E: Entity>(
    State(db): State<DbPool>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    Repository::<E>::new(db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_children<E: ChildEntity>(
    State(db): State<DbPool>,
    Path(parent): Path<String>,
) -> Result<Json<Vec<E>>, ApiError> {
    let parent = parse_id(&parent)?;
    Ok(Json(Repository::<E>::new(db).list_by_parent(parent).await?))
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
}

pub async fn list_tickets(
    State(db): State<DbPool>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let descending = match query.order.as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "order must be 'asc' or 'desc', got '{other}'"
            )))
        }
    };
    let repo = Repository::<Ticket>::new(db);
    let column = query.sort.as_deref().unwrap_or(Ticket::KEY);
    Ok(Json(repo.list_ordered(column, descending).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: TicketStatus,
}

pub async fn set_ticket_status(
    State(db): State<DbPool>,
    Path(id): Path<String>,
    body: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Ticket>, ApiError> {
    let id = parse_id(&id)?;
    let Json(change) = body?;
    let ticket = Repository::<Ticket>::new(db)
        .set_status(id, change.status)
        .await?;
    Ok(Json(ticket))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
