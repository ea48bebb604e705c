use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::notifications::{Notification, NotificationKind},
};

/// Data of one `/sse/notifications` event; the SSE event name repeats `kind`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub content: String,
    /// Challenge the notification refers to.
    pub related_id: Option<Uuid>,
    pub created_at: String,
}

impl From<Notification> for NotificationEvent {
    fn from(notification: Notification) -> Self {
        Self {
            kind: notification.kind,
            content: notification.content,
            related_id: notification.related_id,
            created_at: format_system_time(notification.created_at),
        }
    }
}
