use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::PlayerId;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ChallengeInvite,
    ChallengeAccepted,
    ChallengeRejected,
    ChallengeCancelled,
    ChallengeLost,
    MatchFound,
}

impl NotificationKind {
    /// Wire name, also used as the SSE event name.
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::ChallengeInvite => "challenge_invite",
            NotificationKind::ChallengeAccepted => "challenge_accepted",
            NotificationKind::ChallengeRejected => "challenge_rejected",
            NotificationKind::ChallengeCancelled => "challenge_cancelled",
            NotificationKind::ChallengeLost => "challenge_lost",
            NotificationKind::MatchFound => "match_found",
        }
    }
}

/// Message addressed to a single player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub user_id: PlayerId,
    pub kind: NotificationKind,
    pub content: String,
    /// Challenge the notification refers to.
    pub related_id: Option<Uuid>,
    #[serde(skip)]
    pub created_at: SystemTime,
}

/// Fire-and-forget fan-out of player notifications.
///
/// Delivery never blocks nor fails a core transition: with no subscriber the message is dropped.
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn notify(
        &self,
        user_id: PlayerId,
        kind: NotificationKind,
        content: impl Into<String>,
        related_id: Option<Uuid>,
        created_at: SystemTime,
    ) {
        let notification = Notification {
            user_id,
            kind,
            content: content.into(),
            related_id,
            created_at,
        };
        if self.sender.send(notification).is_err() {
            debug!(%user_id, ?kind, "no notification subscriber; dropping");
        }
    }
}
