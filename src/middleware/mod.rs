pub mod auth;
pub mod extract;
pub mod response;

pub use auth::{access_filter, attach_tokens, decide, expired_refresh_cookie, refresh_cookie, Decision};
pub use extract::Json;
pub use response::{ApiResponse, ApiResult};
