//! Request extractors whose rejections render as `{"error": message}`.
//!
//! Thin wrappers over axum's `Query`, `Path` and `Json` that swap the
//! plain-text rejection for [`ServerError`].

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ServerError;

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServerError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);
