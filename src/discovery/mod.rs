use crate::error::ConfdError;
use async_trait::async_trait;

pub mod http;
pub use http::HttpDiscovery;

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch the current raw discovery payload.
    async fn fetch(&self) -> Result<Vec<u8>, ConfdError>;

    /// Where the payload comes from, for log lines.
    fn endpoint(&self) -> &str;
}
