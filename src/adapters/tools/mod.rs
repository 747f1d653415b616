//! Tool executor adapters.

mod http;
mod mock;

pub use http::HttpToolExecutor;
pub use mock::MockToolExecutor;
