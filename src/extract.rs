//! Extractors for the loosely-typed values experiment pages submit.

use axum::Json;
use axum::extract::{Form, FromRequest, Multipart, Query, Request};
use axum::http::{HeaderMap, header};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::AppError;

/// Query parameters merged with url-encoded or multipart form fields.
/// Form fields win. Uploaded files in a multipart body are skipped.
#[derive(Debug, Default)]
pub struct RequestValues(pub HashMap<String, String>);

impl<S> FromRequest<S> for RequestValues
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(mut values) = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        if has_content_type(req.headers(), "application/x-www-form-urlencoded") {
            let Form(form) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            values.extend(form);
        } else if has_content_type(req.headers(), "multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?
            {
                let Some(name) = field.name().map(str::to_owned) else {
                    continue;
                };
                if field.file_name().is_some() {
                    tracing::debug!(field = %name, "skipping uploaded file");
                    continue;
                }
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                values.insert(name, text);
            }
        }

        Ok(Self(values))
    }
}

/// Arguments of a callable: the JSON body for JSON requests, otherwise
/// the request values as a JSON object of strings.
#[derive(Debug)]
pub struct CallArguments(pub Value);

impl<S> FromRequest<S> for CallArguments
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if has_content_type(req.headers(), "application/json") {
            let Json(body) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return Ok(Self(body));
        }

        let RequestValues(values) = RequestValues::from_request(req, state).await?;
        let args: Map<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(Self(Value::Object(args)))
    }
}

fn has_content_type(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(expected))
}
