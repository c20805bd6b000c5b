use std::error::Error;

use axum::async_trait;
use axum::extract::path::{ErrorKind, FailedToDeserializePathParams};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use num_ordinal::{ordinal0, Osize};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|value| Self(value.0))
            .map_err(json_rejection)
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    let message = match rejection {
        JsonRejection::JsonDataError(error) => {
            let detail = error
                .source()
                .map(|src| first_letter_uppercase(src.to_string()))
                .unwrap_or_default();
            format!("The request body has the wrong shape. {detail}")
        }
        JsonRejection::JsonSyntaxError(_) => "The request body is not valid JSON.".to_string(),
        JsonRejection::MissingJsonContentType(_) => {
            "Send the request body as application/json.".to_string()
        }
        rej => rej.to_string(),
    };

    AppError::Validation(message.trim_end().to_string())
}

pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(PathRejection::FailedToDeserializePathParams(inner)) => {
                Err(path_deserialize_rejection(inner))
            }
            Err(PathRejection::MissingPathParams(error)) => {
                Err(AppError::Validation(error.to_string()))
            }
            Err(err) => {
                tracing::warn!("unhandled path rejection: {err:?}");
                Err(AppError::Validation("The link in this request is malformed.".to_string()))
            }
        }
    }
}

pub struct Query<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(QueryRejection::FailedToDeserializeQueryString(rejection)) => {
                let message = rejection
                    .source()
                    .map(|source| first_letter_uppercase(source.to_string()))
                    .unwrap_or_else(|| "The query string could not be read.".to_string());
                Err(AppError::Validation(message))
            }
            Err(err) => {
                tracing::warn!("unhandled query rejection: {err:?}");
                Err(AppError::Validation("The query string could not be read.".to_string()))
            }
        }
    }
}

fn path_deserialize_rejection(cause: FailedToDeserializePathParams) -> AppError {
    let message = match cause.into_kind() {
        ErrorKind::WrongNumberOfParameters { got, expected } => {
            format!("This endpoint takes {expected} path parameters, got {got}.")
        }
        ErrorKind::ParseErrorAtIndex {
            index,
            value,
            expected_type,
        } => {
            let friendly_type = match expected_type {
                "i32" | "i64" | "u32" | "u64" => "integer",
                "f32" | "f64" => "decimal number",
                _ => expected_type,
            };
            let ord: Osize = ordinal0(index);
            let art = indefinite_article(friendly_type);

            format!("The {ord} path parameter ('{value}') should be {art} {friendly_type}.")
        }
        ErrorKind::Message(msg) => format!("The path parameters are invalid: {msg}"),
        err => {
            tracing::warn!("unhandled path deserialize rejection: {err:?}");
            err.to_string()
        }
    };

    AppError::Validation(message)
}

fn indefinite_article(word: &str) -> &'static str {
    match word.to_lowercase().chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

fn first_letter_uppercase(s: String) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().chain(c).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn articles() {
        assert_eq!(indefinite_article("integer"), "an");
        assert_eq!(indefinite_article("decimal number"), "a");
    }

    #[test]
    fn uppercases_the_first_letter_only() {
        assert_eq!(first_letter_uppercase("missing field `x`".to_string()), "Missing field `x`");
        assert_eq!(first_letter_uppercase(String::new()), "");
    }
}
