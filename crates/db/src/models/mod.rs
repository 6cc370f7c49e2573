pub mod job;
pub mod notification;
