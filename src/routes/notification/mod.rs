mod handler;
mod model;

pub use handler::{delete_notification, list_notifications, mark_notification_read};
pub use model::{CreateNotificationRequest, Notification, NotificationType};
