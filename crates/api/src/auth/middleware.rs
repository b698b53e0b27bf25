use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Attaches `Claims` to the request when a valid bearer token is present.
/// Requests without one continue anonymously; resolvers decide whether that
/// is acceptable.
pub async fn optional_jwt_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if let Some(token) = token {
        match state.jwt_service().verify_token(token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring invalid bearer token"),
        }
    }

    next.run(request).await
}
