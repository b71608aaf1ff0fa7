pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};
