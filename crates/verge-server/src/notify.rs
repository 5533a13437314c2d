//! Notification dispatch.
//!
//! The orchestrator calls [`verge_core::store::Notifier::notify`]
//! synchronously from inside lifecycle operations, so delivery must never
//! block or fail the operation itself. [`QueueNotifier`] decouples the two:
//! notify() enqueues, and a background dispatcher task delivers to each
//! configured [`Channel`] with bounded retries.

use std::sync::Arc;

use tokio::{
  sync::mpsc,
  task::JoinHandle,
  time::{Duration, sleep},
};
use verge_core::{audit::Notification, store::Notifier};

/// Delivery attempts per channel before a notification is dropped.
const MAX_ATTEMPTS: u32 = 3;
/// Pause between delivery attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// One delivery target (log line, webhook, email relay, ...).
pub trait Channel: Send + Sync + 'static {
  fn name(&self) -> &str;
  fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the tracing log. The always-on default channel.
pub struct LogChannel;

impl Channel for LogChannel {
  fn name(&self) -> &str {
    "log"
  }

  fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
    tracing::info!(
      action = %notification.action,
      status = %notification.status,
      actor = %notification.actor.attribution(),
      "notification: {}",
      notification.details,
    );
    Ok(())
  }
}

/// Non-blocking [`Notifier`] backed by an unbounded queue and a dispatcher
/// task.
#[derive(Clone)]
pub struct QueueNotifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl QueueNotifier {
  /// Start a dispatcher over `channels` and return the notifier feeding it.
  ///
  /// The dispatcher runs until every clone of the notifier is dropped.
  pub fn spawn(channels: Vec<Arc<dyn Channel>>) -> (Self, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let handle = tokio::spawn(async move {
      while let Some(notification) = rx.recv().await {
        for channel in &channels {
          dispatch(channel.as_ref(), &notification).await;
        }
      }
    });
    (Self { tx }, handle)
  }
}

async fn dispatch(channel: &dyn Channel, notification: &Notification) {
  for attempt in 1..=MAX_ATTEMPTS {
    match channel.deliver(notification) {
      Ok(()) => return,
      Err(e) if attempt < MAX_ATTEMPTS => {
        tracing::warn!(
          channel = channel.name(),
          attempt,
          "notification delivery failed, retrying: {e}"
        );
        sleep(RETRY_DELAY).await;
      }
      Err(e) => {
        tracing::error!(
          channel = channel.name(),
          "notification dropped after {MAX_ATTEMPTS} attempts: {e}"
        );
      }
    }
  }
}

impl Notifier for QueueNotifier {
  fn notify(&self, notification: Notification) {
    if self.tx.send(notification).is_err() {
      tracing::warn!("notification dispatcher is gone, dropping notification");
    }
  }
}
