mod common;

use api::payments::CheckoutMode;
use api::routes::payments::{checkout_success, SuccessQuery};
use api::services::{DeliveryOutcome, Reconciler};
use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{Duration, Utc};
use common::*;
use infra::models::MembershipRow;
use infra::repos::{ClubRepo, MembershipRepo, WebhookEventRepo};
use serde_json::json;
use uuid::Uuid;

const JOIN: &str = r#"
    mutation Join($clubId: ID!) {
        createMembershipCheckout(clubId: $clubId) {
            membership { status }
            checkout { url sessionId }
        }
    }
"#;

const DELETE_CLUB: &str = r#"
    mutation Delete($clubId: ID!) { deleteClub(clubId: $clubId) { deleted warnings } }
"#;

async fn deliver(app: &TestApp, event_type: &str, created: i64, object: serde_json::Value) -> DeliveryOutcome {
    let (_, payload) = provider_event(event_type, created, object);
    Reconciler::new(app.state.clone())
        .handle_delivery(&payload, Some(&sign(&payload)))
        .await
        .expect("webhook should be processed")
}

/// Runs a paid membership checkout to completion with the given subscription id.
async fn subscribe(app: &TestApp, claims: &api::auth::Claims, club_id: Uuid, subscription_id: &str, at: i64) {
    let response = execute_graphql(
        &app.schema,
        JOIN,
        Some(json!({ "clubId": club_id.to_string() })),
        Some(claims.clone()),
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    let session_id = data["createMembershipCheckout"]["checkout"]["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    app.provider
        .sessions
        .lock()
        .unwrap()
        .get_mut(&session_id)
        .unwrap()
        .subscription = Some(subscription_id.to_string());
    let session = app.provider.complete_session(&session_id, 1500);
    deliver(app, "checkout.session.completed", at, checkout_object(&session)).await;
}

async fn membership(app: &TestApp, user_id: Uuid, club_id: Uuid) -> Option<MembershipRow> {
    MembershipRepo::new(app.state.db.clone()).get(user_id, club_id).await.unwrap()
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_free_club_activates_immediately() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let (user, claims) = create_test_user(&app.state, "ada").await;

    let response = execute_graphql(
        &app.schema,
        JOIN,
        Some(json!({ "clubId": club.id.to_string() })),
        Some(claims.clone()),
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["createMembershipCheckout"]["membership"]["status"], "active");
    assert!(data["createMembershipCheckout"]["checkout"].is_null());
    assert!(app.provider.checkout_requests.lock().unwrap().is_empty());

    let row = membership(&app, user.id, club.id).await.unwrap();
    assert_eq!(row.status, "active");

    let response = execute_graphql(
        &app.schema,
        JOIN,
        Some(json!({ "clubId": club.id.to_string() })),
        Some(claims),
    )
    .await;
    assert_eq!(error_code(&response).as_deref(), Some("ALREADY_CONFIRMED"));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_paid_club_subscribes_through_checkout() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, Some(1500)).await;
    let (user, claims) = create_test_user(&app.state, "ada").await;
    let now = Utc::now().timestamp();

    subscribe(&app, &claims, club.id, "sub_ada", now).await;

    let requests = app.provider.checkout_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].mode, CheckoutMode::Subscription);
    let prices = app.provider.prices.lock().unwrap().clone();
    assert_eq!(prices[0].recurring_interval, Some("month"));
    assert_eq!(prices[0].unit_amount, 1500);

    let stored = ClubRepo::new(app.state.db.clone()).get(club.id).await.unwrap().unwrap();
    assert!(stored.provider_price_id.is_some());

    let row = membership(&app, user.id, club.id).await.unwrap();
    assert_eq!(row.status, "active");
    assert_eq!(row.provider_subscription_id.as_deref(), Some("sub_ada"));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_membership_redirect_waits_for_webhook() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, Some(1500)).await;
    let (user, claims) = create_test_user(&app.state, "ada").await;

    let response = execute_graphql(
        &app.schema,
        JOIN,
        Some(json!({ "clubId": club.id.to_string() })),
        Some(claims),
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    let session_id = data["createMembershipCheckout"]["checkout"]["sessionId"]
        .as_str()
        .unwrap()
        .to_string();
    let session = app.provider.complete_session(&session_id, 1500);

    let redirect = checkout_success(
        State(app.state.clone()),
        Query(SuccessQuery { session_id: session_id.clone() }),
    )
    .await
    .expect("redirect")
    .into_response();
    assert_eq!(redirect.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        redirect.headers()[LOCATION],
        format!("http://app.test/clubs/{}", club.id).as_str()
    );
    assert!(
        membership(&app, user.id, club.id).await.map_or(true, |m| m.status != "active"),
        "the redirect alone never activates a membership"
    );

    deliver(&app, "checkout.session.completed", Utc::now().timestamp(), checkout_object(&session)).await;
    assert_eq!(membership(&app, user.id, club.id).await.unwrap().status, "active");
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_out_of_order_subscription_events() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, Some(1500)).await;
    let (user, claims) = create_test_user(&app.state, "ada").await;
    let t0 = Utc::now() - Duration::minutes(10);

    subscribe(&app, &claims, club.id, "sub_ooo", t0.timestamp()).await;

    // Cancellation arrives first.
    deliver(
        &app,
        "customer.subscription.deleted",
        (t0 + Duration::minutes(5)).timestamp(),
        json!({ "id": "sub_ooo", "status": "canceled" }),
    )
    .await;
    assert_eq!(membership(&app, user.id, club.id).await.unwrap().status, "inactive");

    // An older "active" update is stale and must not resurrect the membership.
    deliver(
        &app,
        "customer.subscription.updated",
        (t0 + Duration::minutes(2)).timestamp(),
        json!({ "id": "sub_ooo", "status": "active" }),
    )
    .await;
    assert_eq!(membership(&app, user.id, club.id).await.unwrap().status, "inactive");
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_invoice_events_track_billing() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, Some(1500)).await;
    let (user, claims) = create_test_user(&app.state, "ada").await;
    let t0 = Utc::now() - Duration::minutes(10);

    subscribe(&app, &claims, club.id, "sub_billing", t0.timestamp()).await;

    deliver(
        &app,
        "invoice.payment_failed",
        (t0 + Duration::minutes(1)).timestamp(),
        json!({ "id": "in_1", "subscription": "sub_billing" }),
    )
    .await;
    assert_eq!(membership(&app, user.id, club.id).await.unwrap().status, "inactive");

    let period_end = (t0 + Duration::days(30)).timestamp();
    deliver(
        &app,
        "invoice.paid",
        (t0 + Duration::minutes(2)).timestamp(),
        json!({ "id": "in_2", "subscription": "sub_billing", "period_end": period_end, "amount_paid": 1500 }),
    )
    .await;
    let row = membership(&app, user.id, club.id).await.unwrap();
    assert_eq!(row.status, "active");
    assert_eq!(row.current_period_end.map(|t| t.timestamp()), Some(period_end));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_unknown_subscription_is_acknowledged() {
    let app = setup_test_app().await;
    let (event_id, payload) = provider_event(
        "customer.subscription.deleted",
        Utc::now().timestamp(),
        json!({ "id": "sub_nobody", "status": "canceled" }),
    );

    let outcome = Reconciler::new(app.state.clone())
        .handle_delivery(&payload, Some(&sign(&payload)))
        .await
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Processed);

    let recorded = WebhookEventRepo::new(app.state.db.clone())
        .get(&event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(recorded.processed);
    assert!(recorded.processing_error.is_none());
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_delete_club_cancels_best_effort() {
    let app = setup_test_app().await;
    let (organizer, organizer_claims) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, Some(1500)).await;
    let event = create_test_event(&app.state, club.id, None, None, false).await;
    let (_, ada) = create_test_user(&app.state, "ada").await;
    let (_, bob) = create_test_user(&app.state, "bob").await;
    let now = Utc::now().timestamp();

    subscribe(&app, &ada, club.id, "sub_ok", now).await;
    subscribe(&app, &bob, club.id, "sub_broken", now).await;
    set_rsvp(&app, &ada, event.id, "GOING").await;
    app.provider
        .failing_cancellations
        .lock()
        .unwrap()
        .push("sub_broken".to_string());

    // Only the organizer may delete.
    let response = execute_graphql(
        &app.schema,
        DELETE_CLUB,
        Some(json!({ "clubId": club.id.to_string() })),
        Some(ada.clone()),
    )
    .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let response = execute_graphql(
        &app.schema,
        DELETE_CLUB,
        Some(json!({ "clubId": club.id.to_string() })),
        Some(organizer_claims),
    )
    .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["deleteClub"]["deleted"], true);
    let warnings = data["deleteClub"]["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("sub_broken"));

    assert_eq!(app.provider.cancelled.lock().unwrap().clone(), vec!["sub_ok".to_string()]);
    assert!(ClubRepo::new(app.state.db.clone()).get(club.id).await.unwrap().is_none());
    assert!(MembershipRepo::new(app.state.db.clone())
        .subscription_ids_for_club(club.id)
        .await
        .unwrap()
        .is_empty());
}
