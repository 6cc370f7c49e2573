pub mod job_repo;
pub mod notification_event_repo;
pub mod recipient_repo;

pub use job_repo::JobRepo;
pub use notification_event_repo::NotificationEventRepo;
pub use recipient_repo::RecipientRepo;
