//! NDVI update endpoint

use axum::{
  body::Bytes,
  extract::{Query, State},
  http::{header, HeaderMap, StatusCode},
  response::Json,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::FieldQuery;
use crate::pipeline::IngestRequest;
use crate::server::types::{ApiResponse, ResponseCode, UpdateQuery, UpdateRequest};
use crate::server::AppState;

type Reply = (StatusCode, Json<ApiResponse>);

static FIELD_ID_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[0-9a-fA-F-]{36}$").expect("field id pattern is valid"));

fn reply(status: StatusCode, response: ApiResponse) -> Reply {
  (status, Json(response))
}

/// POST /api/ndvi/update - Run the pipeline over the caller's fields
pub async fn update_ndvi(
  State(state): State<AppState>,
  Query(query): Query<UpdateQuery>,
  headers: HeaderMap,
  body: Bytes,
) -> Reply {
  let Some(token) = bearer_token(&headers) else {
    return reply(StatusCode::UNAUTHORIZED, ApiResponse::new(ResponseCode::Unauthenticated));
  };
  let user_id = match state.auth.resolve_user(token).await {
    Ok(Some(user_id)) => user_id,
    Ok(None) => {
      return reply(StatusCode::UNAUTHORIZED, ApiResponse::new(ResponseCode::Unauthenticated));
    }
    Err(e) => {
      tracing::warn!(error = %e, "could not resolve caller session");
      return reply(StatusCode::UNAUTHORIZED, ApiResponse::new(ResponseCode::Unauthenticated));
    }
  };

  let request = match parse_body(&headers, &body) {
    Ok(request) => request,
    Err(e) => {
      return reply(StatusCode::BAD_REQUEST, ApiResponse::new(ResponseCode::InvalidJson).with_error(e));
    }
  };

  // An empty identifier means "all of the caller's fields"
  let field_id = request.field_id.or(query.field_id).filter(|id| !id.is_empty());
  if let Some(id) = field_id.as_deref() {
    if !is_valid_field_id(id) {
      return reply(StatusCode::BAD_REQUEST, ApiResponse::new(ResponseCode::InvalidField));
    }
  }

  let date = match request.date.as_deref().map(parse_date).transpose() {
    Ok(date) => date,
    Err(e) => {
      return reply(StatusCode::BAD_REQUEST, ApiResponse::new(ResponseCode::InvalidDate).with_error(e));
    }
  };

  let fields = match state.directory.list_fields(&FieldQuery::owned_by(&user_id).with_field(field_id)).await
  {
    Ok(fields) => fields,
    Err(e) => {
      tracing::error!(user_id = %user_id, error = %e, "failed to load fields");
      return reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiResponse::new(ResponseCode::FieldsError).with_error(e),
      );
    }
  };
  if fields.is_empty() {
    return reply(StatusCode::OK, ApiResponse::new(ResponseCode::NoFields));
  }

  let mut ingest = IngestRequest::new(fields);
  if let Some(date) = date {
    ingest = ingest.with_date(date);
  }

  match state.pipeline.run(ingest).await {
    Ok(summary) => {
      tracing::info!(
        user_id = %user_id,
        inserted = summary.inserted,
        skipped = summary.skipped,
        failed = summary.failed,
        "NDVI update finished"
      );
      let details = serde_json::to_value(&summary).unwrap_or_default();
      reply(StatusCode::OK, ApiResponse::new(ResponseCode::Success).with_details(details))
    }
    Err(e) => {
      tracing::error!(user_id = %user_id, error = %e, "NDVI update failed");
      reply(StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::new(ResponseCode::UpdateFailed).with_error(e))
    }
  }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Only JSON bodies are read, and a JSON body must parse, even when blank
fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<UpdateRequest, serde_json::Error> {
  let is_json = headers
    .get(header::CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .is_some_and(|value| value.contains("application/json"));
  if !is_json {
    return Ok(UpdateRequest::default());
  }
  serde_json::from_slice(body)
}

fn is_valid_field_id(id: &str) -> bool {
  FIELD_ID_PATTERN.is_match(id)
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
  DateTime::parse_from_rfc3339(value).map(|date| date.with_timezone(&Utc))
}
