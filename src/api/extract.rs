//! Request-body extraction for the content types the API accepts:
//! `application/json`, `application/x-www-form-urlencoded`, and
//! `multipart/form-data`, all deserialised into the same request DTOs.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::ApiError;

pub struct BodyPayload<T>(pub T);

impl<T, S> FromRequest<S> for BodyPayload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("application/json") {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(format!("Invalid JSON body: {e}")))?;
            return Ok(Self(value));
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(format!("Invalid form body: {e}")))?;
            return Ok(Self(value));
        }

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?;

            let mut fields = Map::new();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::validation(format!("Invalid multipart field: {e}")))?
            {
                let Some(name) = field.name().map(ToString::to_string) else {
                    continue;
                };
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid multipart field: {e}")))?;
                fields.insert(name, Value::String(text));
            }

            let value = serde_json::from_value(Value::Object(fields))
                .map_err(|e| ApiError::validation(format!("Invalid multipart body: {e}")))?;
            return Ok(Self(value));
        }

        Err(ApiError::validation(
            "Unsupported content type; use JSON, form, or multipart",
        ))
    }
}
