pub mod internal;
pub mod jobs;
