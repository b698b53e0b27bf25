use std::time::Duration;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse, GraphQLSubscription};
use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::middleware::optional_jwt_auth;
use crate::auth::Claims;
use crate::error::AppError;
use crate::gql::AppSchema;
use crate::routes::provider_routes;
use crate::state::AppState;

/// Build the Axum router: health, GraphQL (queries and mutations over POST,
/// subscriptions over websocket) and the payment provider endpoints.
pub fn build_router(state: AppState, schema: AppSchema) -> Router {
    let gql_ws = GraphQLSubscription::new(schema.clone());

    Router::new()
        // Simple liveness check; also proves DB connectivity.
        .route("/health", get(health))
        .route("/graphql", post(graphql_handler).get_service(gql_ws))
        .merge(provider_routes())
        .layer(Extension(schema))
        .layer(from_fn_with_state(state.clone(), optional_jwt_auth))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
}

/// Forwards the caller's claims, if any, into the GraphQL context.
async fn graphql_handler(
    Extension(schema): Extension<AppSchema>,
    claims: Option<Extension<Claims>>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Some(Extension(claims)) = claims {
        request = request.data(claims);
    }
    schema.execute(request).await.into()
}

async fn health(State(state): State<AppState>) -> Result<&'static str, AppError> {
    infra::db::ping(&state.db).await?;
    Ok("ok")
}
