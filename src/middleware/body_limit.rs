//! Request body buffering with a hard size ceiling.
//!
//! Bodies are read fully before the request moves on, so an oversized
//! upload is rejected here and never reaches the rate limiter or a handler.
//! A declared `Content-Length` over the limit is rejected without reading.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use super::BODY_LIMIT_BYTES;
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum BufferError {
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("failed to read body: {0}")]
    Read(#[from] axum::Error),
}

pub async fn limit_body(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    if declared_length(&parts.headers).is_some_and(|len| len > BODY_LIMIT_BYTES) {
        return ApiError::PayloadTooLarge { limit: BODY_LIMIT_BYTES }.into_response();
    }

    let bytes = match buffer(body, BODY_LIMIT_BYTES).await {
        Ok(bytes) => bytes,
        Err(BufferError::TooLarge(limit)) => return ApiError::PayloadTooLarge { limit }.into_response(),
        Err(e) => return ApiError::BadRequest(e.to_string()).into_response(),
    };

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}

/// Read a body into memory, failing as soon as it grows past `limit`.
pub(crate) async fn buffer(body: Body, limit: usize) -> Result<Bytes, BufferError> {
    let mut stream = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(BufferError::TooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
