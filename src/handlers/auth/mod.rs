pub mod recovery;
pub mod session;

pub use recovery::{recovery, recovery_confirm, verify};
pub use session::{login, logout, me, refresh, resource_token};
