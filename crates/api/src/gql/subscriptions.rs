use async_graphql::{Context, Result, Subscription, ID};
use futures_util::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::gql::types::{parse_id, RegistrationUpdate};
use crate::state::AppState;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Status changes for one event as they commit. Lagging subscribers
    /// skip the updates they missed.
    async fn registration_updates(
        &self,
        ctx: &Context<'_>,
        event_id: ID,
    ) -> Result<impl Stream<Item = RegistrationUpdate>> {
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&event_id, "eventId")?;
        let receiver = state.subscribe_registrations();

        Ok(BroadcastStream::new(receiver).filter_map(move |message| match message {
            Ok(change) if change.event_id == event_id => Some(RegistrationUpdate::from(change)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "registration update stream lagged");
                None
            }
        }))
    }
}
