use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::access::{bearer_token, AccessChain, Rejection};
use crate::auth::TokenError;
use crate::error::ApiError;

/// Runs the access chain for the route group and injects the verified
/// `AuthUser` into request extensions.
pub async fn access_middleware(
    State(chain): State<Arc<AccessChain>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authorize_headers(&chain, request.headers()).map_err(|rejection| {
        tracing::warn!(
            "Rejected {} {}: {}",
            request.method(),
            request.uri().path(),
            rejection
        );
        ApiError::from(rejection)
    })?;

    tracing::debug!("Authorized {} ({}) for {}", user.handle, user.role, request.uri().path());
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn authorize_headers(chain: &AccessChain, headers: &HeaderMap) -> Result<crate::auth::AuthUser, Rejection> {
    let header = headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| Rejection::InvalidToken(TokenError::Malformed)))
        .transpose()?;
    let token = bearer_token(header)?;
    chain.authorize(Some(token))
}
