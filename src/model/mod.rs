pub mod admin_log;
pub mod content_type;
pub mod group;
pub mod lookup;
pub mod permission;
pub mod user;
