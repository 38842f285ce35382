use async_trait::async_trait;
use tracing::info;

/// Receiver for the background-sync and push integration points.
///
/// The proxy forwards these events untouched; interpreting them is up to the
/// implementation.
#[async_trait]
pub trait IntegrationHooks: Send + Sync {
  async fn on_sync(&self, tag: &str);

  async fn on_push(&self, payload: Option<serde_json::Value>);
}

/// Default hooks: log and drop.
pub struct LoggingHooks;

#[async_trait]
impl IntegrationHooks for LoggingHooks {
  async fn on_sync(&self, tag: &str) {
    info!(tag, "background sync triggered");
  }

  async fn on_push(&self, payload: Option<serde_json::Value>) {
    match payload {
      Some(payload) => info!(%payload, "push message received"),
      None => info!("push message received without payload"),
    }
  }
}
