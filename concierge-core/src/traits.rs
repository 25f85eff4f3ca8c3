use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;

/// Re-submits a dead-lettered payload to its original destination.
#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn replay(&self, payload: Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut, E> ReplayHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async fn replay(&self, payload: Value) -> anyhow::Result<()> {
        (self)(payload)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}
