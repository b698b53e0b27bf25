mod common;

use api::services::RsvpService;
use common::*;
use infra::repos::{MembershipRepo, MembershipStatus, RegistrationRepo};
use infra::rsvp::RsvpStatus;
use serde_json::json;

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_free_event_goes_straight_to_going() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, Some(10), false).await;
    let (_, claims) = create_test_member(&app.state, club.id, "ada").await;

    let response = set_rsvp(&app, &claims, event.id, "GOING").await;

    assert!(response.errors.is_empty(), "setRsvp failed: {:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["setRsvp"]["registration"]["status"], "GOING");
    assert_eq!(data["setRsvp"]["requiresPayment"], false);
    assert!(
        app.provider.checkout_requests.lock().unwrap().is_empty(),
        "free events never touch the provider"
    );
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_paid_event_last_seat_is_exclusive() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, Some(2500), Some(1), false).await;
    let (_, alice) = create_test_member(&app.state, club.id, "alice").await;
    let (_, bob) = create_test_member(&app.state, club.id, "bob").await;

    let response = set_rsvp(&app, &alice, event.id, "GOING").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["setRsvp"]["registration"]["status"], "PENDING_PAYMENT");
    assert_eq!(data["setRsvp"]["requiresPayment"], true);

    let response = set_rsvp(&app, &bob, event.id, "GOING").await;
    assert_eq!(error_code(&response).as_deref(), Some("CAPACITY_EXCEEDED"));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_concurrent_requests_never_oversell() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, Some(3), false).await;

    let mut users = Vec::new();
    for i in 0..10 {
        let (user, _) = create_test_member(&app.state, club.id, &format!("racer{i}")).await;
        users.push(user);
    }

    let mut handles = Vec::new();
    for user in users {
        let state = app.state.clone();
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            RsvpService::new(state)
                .set_rsvp(&user, event_id, RsvpStatus::Going)
                .await
        }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.registration.status, "going");
                admitted += 1;
            }
            Err(e) => {
                assert_eq!(e.code(), "CAPACITY_EXCEEDED");
                refused += 1;
            }
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(refused, 7);

    let going = RegistrationRepo::new(app.state.db.clone())
        .list_by_event(event.id, Some(RsvpStatus::Going), None)
        .await
        .unwrap();
    assert_eq!(going.len(), 3);
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_withdrawing_releases_the_seat() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, Some(1), false).await;
    let (_, alice) = create_test_member(&app.state, club.id, "alice").await;
    let (_, bob) = create_test_member(&app.state, club.id, "bob").await;

    assert!(set_rsvp(&app, &alice, event.id, "GOING").await.errors.is_empty());
    assert!(set_rsvp(&app, &alice, event.id, "NOT_GOING").await.errors.is_empty());

    let response = set_rsvp(&app, &bob, event.id, "GOING").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_holder_refresh_is_not_capacity_checked() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, Some(1), false).await;
    let (_, alice) = create_test_member(&app.state, club.id, "alice").await;

    assert!(set_rsvp(&app, &alice, event.id, "GOING").await.errors.is_empty());
    let response = set_rsvp(&app, &alice, event.id, "GOING").await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["setRsvp"]["registration"]["status"], "GOING");
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_only_going_and_not_going_can_be_requested() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, Some(2500), None, false).await;
    let (_, claims) = create_test_member(&app.state, club.id, "sneaky").await;

    let response = set_rsvp(&app, &claims, event.id, "GOING").await;
    assert!(response.errors.is_empty());

    // Paying is the provider's job, not the registrant's.
    let response = set_rsvp(&app, &claims, event.id, "APPROVED_PENDING_PAYMENT").await;
    assert_eq!(error_code(&response).as_deref(), Some("BAD_USER_INPUT"));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_going_requires_active_membership() {
    let app = setup_test_app().await;
    let (organizer, organizer_claims) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, Some(10), false).await;
    let (_, outsider) = create_test_user(&app.state, "outsider").await;
    let (lapsed, lapsed_claims) = create_test_member(&app.state, club.id, "lapsed").await;
    let (_, member) = create_test_member(&app.state, club.id, "member").await;

    let response = set_rsvp(&app, &outsider, event.id, "GOING").await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
    let outsider_rows = RegistrationRepo::new(app.state.db.clone())
        .list_by_event(event.id, None, None)
        .await
        .unwrap();
    assert!(outsider_rows.is_empty(), "a refused request writes nothing");

    sqlx::query("UPDATE club_memberships SET status = $1 WHERE user_id = $2 AND club_id = $3")
        .bind(MembershipStatus::Inactive.as_str())
        .bind(lapsed.id)
        .bind(club.id)
        .execute(&app.state.db)
        .await
        .unwrap();
    let response = set_rsvp(&app, &lapsed_claims, event.id, "GOING").await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    // Withdrawing never needs a membership.
    let response = set_rsvp(&app, &outsider, event.id, "NOT_GOING").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let response = set_rsvp(&app, &member, event.id, "GOING").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let response = set_rsvp(&app, &organizer_claims, event.id, "GOING").await;
    assert!(response.errors.is_empty(), "organizer is exempt: {:?}", response.errors);
    assert!(MembershipRepo::new(app.state.db.clone())
        .get(organizer.id, club.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_rsvp_requires_authentication() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, None, None, false).await;

    let response = execute_graphql(
        &app.schema,
        SET_RSVP,
        Some(json!({ "eventId": event.id.to_string(), "status": "GOING" })),
        None,
    )
    .await;

    assert_eq!(error_code(&response).as_deref(), Some("UNAUTHENTICATED"));
}

#[tokio::test]
#[ignore = "requires Postgres at TEST_DATABASE_URL"]
async fn test_capacity_query_reflects_reservations() {
    let app = setup_test_app().await;
    let (organizer, _) = create_test_organizer(&app.state).await;
    let club = create_test_club(&app.state, organizer.id, None).await;
    let event = create_test_event(&app.state, club.id, Some(1000), Some(2), false).await;
    let (_, alice) = create_test_member(&app.state, club.id, "alice").await;

    assert!(set_rsvp(&app, &alice, event.id, "GOING").await.errors.is_empty());

    let response = execute_graphql(
        &app.schema,
        r#"query Cap($id: ID!) { eventCapacity(eventId: $id) { reserved maxCapacity available isFull } }"#,
        Some(json!({ "id": event.id.to_string() })),
        None,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["eventCapacity"]["reserved"], 1);
    assert_eq!(data["eventCapacity"]["available"], 1);
    assert_eq!(data["eventCapacity"]["isFull"], false);
}
