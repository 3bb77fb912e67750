use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` whose rejections render as the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);
