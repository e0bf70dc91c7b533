//! `/api/events` — the SSE stream every subscriber (browser tab, bot
//! notifier) taps for advisory state changes (§4.2, §6).

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use pubguard_core::events::EventBus;
use tokio_stream::Stream;

use crate::error::ApiError;
use crate::state::AppState;

/// Wraps the bus's receiver so dropping the stream (client disconnect)
/// always releases the subscriber slot, regardless of which branch the
/// handler exits through.
struct EventStream {
    bus: Arc<EventBus>,
    id: u64,
    receiver: tokio::sync::mpsc::Receiver<pubguard_core::events::Event>,
}

impl Stream for EventStream {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                let sse = SseEvent::default()
                    .event(event.name())
                    .data(payload)
                    .retry(Duration::from_millis(5000));
                Poll::Ready(Some(Ok(sse)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// `GET /api/events` — returns 503 once the subscriber ceiling (default 16)
/// is already reached.
pub async fn stream(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let subscription = state.events.subscribe()?;

    let stream = EventStream {
        bus: state.events.clone(),
        id: subscription.id,
        receiver: subscription.receiver,
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
