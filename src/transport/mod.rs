//! HTTP transport: header construction, the raw client, and the executor
//! that applies the 401 recovery policy.

pub mod executor;
pub mod headers;
pub mod http;

pub use executor::RequestExecutor;
pub use http::HttpTransport;
