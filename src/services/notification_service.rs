use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dao::models::PlayerId,
    dto::notifications::NotificationEvent,
    state::{SharedState, notifications::Notification},
};

/// Open a notification stream carrying only the messages addressed to `player_id`.
pub fn player_stream(
    state: &SharedState,
    player_id: PlayerId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let receiver = state.notifications().subscribe();
    info!(%player_id, "notification stream connected");
    to_sse_stream(receiver, player_id)
}

fn to_sse_stream(
    mut receiver: broadcast::Receiver<Notification>,
    player_id: PlayerId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(notification) if notification.user_id == player_id => {
                            let Some(event) = to_event(notification) else {
                                continue;
                            };
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(%player_id, skipped, "notification stream lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%player_id, "notification stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(notification: Notification) -> Option<Event> {
    let name = notification.kind.as_str();
    match Event::default()
        .event(name)
        .json_data(NotificationEvent::from(notification))
    {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to encode notification");
            None
        }
    }
}
