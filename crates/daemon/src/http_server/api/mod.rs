use axum::Router;

mod caller;
mod error;
pub mod v1;

pub use caller::{request_credentials, Caller};
pub use error::ApiError;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .merge(v1::router(state.clone()))
        .with_state(state)
}
