//! Contact book handlers. Every operation is scoped to the
//! authenticated owner; a foreign contact id reads as absent.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::dtos::{BirthdaysQuery, ContactPayload, ListQuery, SearchQuery};
use crate::errors::AppError;
use crate::models::{Contact, CurrentUser};
use crate::utils::validation::ValidatedJson;
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let contacts = state
        .contacts
        .list(user.id, query.skip, query.limit)
        .await?;
    Ok(Json(contacts))
}

pub async fn get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(contact_id): Path<i64>,
) -> Result<Json<Contact>, AppError> {
    let contact = state.contacts.get(user.id, contact_id).await?;
    Ok(Json(contact))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(body): ValidatedJson<ContactPayload>,
) -> Result<(StatusCode, Json<Contact>), AppError> {
    let contact = state.contacts.create(user.id, body.into()).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(contact_id): Path<i64>,
    ValidatedJson(body): ValidatedJson<ContactPayload>,
) -> Result<Json<Contact>, AppError> {
    let contact = state
        .contacts
        .update(user.id, contact_id, body.into())
        .await?;
    Ok(Json(contact))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(contact_id): Path<i64>,
) -> Result<Json<Contact>, AppError> {
    let contact = state.contacts.delete(user.id, contact_id).await?;
    Ok(Json(contact))
}

pub async fn search(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let contacts = state.contacts.search(user.id, &query.q).await?;
    Ok(Json(contacts))
}

pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<BirthdaysQuery>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let contacts = state
        .contacts
        .upcoming_birthdays(user.id, query.days)
        .await?;
    Ok(Json(contacts))
}
