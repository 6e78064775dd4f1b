//! Synchronization channel primitives

pub mod notification;
pub mod suspend;

pub use notification::{Notification, NotificationCounters, Wake};
pub use suspend::SuspendFlag;
