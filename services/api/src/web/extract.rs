//! services/api/src/web/extract.rs
//!
//! JSON body extractors whose rejections use the API's failure shape instead
//! of axum's plain-text bodies.

use crate::web::rest::Failure;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

fn rejected(rejection: JsonRejection) -> Failure {
    Failure::new(rejection.status(), rejection.body_text())
}

/// A required JSON body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(rejected)?;
        Ok(Self(value))
    }
}

/// A JSON body that may be left out entirely.
///
/// An empty body yields `T::default()`. A non-empty body must parse as `T`,
/// whatever its `Content-Type`.
pub struct OptionalJson<T>(pub T);

impl<S, T> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| Failure::new(e.status(), e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        let Json(value) = Json::<T>::from_bytes(&bytes).map_err(rejected)?;
        Ok(Self(value))
    }
}
