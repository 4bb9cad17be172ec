use async_trait::async_trait;
use serde_json::Value;

/// Delivery transport for push notifications.
///
/// The actual delivery service (web push, FCM, ...) lives outside this
/// crate; the dispatcher only needs "send this payload to this endpoint,
/// tell me if it failed". Failures are the caller's problem to swallow.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, endpoint: &str, payload: &Value) -> anyhow::Result<()>;
}

/// Default transport when no delivery service is configured: logs the
/// payload at debug level and reports success.
pub struct LogPush;

#[async_trait]
impl PushTransport for LogPush {
    async fn push(&self, endpoint: &str, payload: &Value) -> anyhow::Result<()> {
        tracing::debug!(endpoint = %endpoint, payload = %payload, "push transport not configured, dropping");
        Ok(())
    }
}
