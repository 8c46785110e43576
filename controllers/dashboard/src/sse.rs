//! Server-sent event framing of stream subscriptions.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;
use watch_engine::{Payload, Subscription};

/// Interval between keep-alive comments on an idle stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE event carrying one payload.
#[must_use]
pub fn event(payload: &Payload) -> Event {
    Event::default()
        .event(payload.event_name())
        .data(payload.data())
}

/// Turns a subscription into an SSE response.
///
/// Dropping the response (client disconnect) drops the subscription, which
/// unsubscribes it from the hub.
pub fn stream(subscription: Subscription) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = futures::stream::unfold(subscription, |mut subscription| async move {
        match subscription.recv().await {
            Some(payload) => Some((Ok(event(&payload)), subscription)),
            None => {
                debug!("Stream {} closed", subscription.key());
                None
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
}
