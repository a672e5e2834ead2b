pub mod failed;
pub mod jobs;
