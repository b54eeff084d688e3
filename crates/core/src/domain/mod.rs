pub mod directory;
pub mod insight;
pub mod worklog;
