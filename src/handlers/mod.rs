// handlers/mod.rs - request handlers grouped by resource family
//
// Access control happens before any of these run (middleware::access_filter);
// handlers only enforce ownership rules that depend on the path id.
pub mod admins;
pub mod auth;
pub mod directory;
pub mod system;
pub mod users;
