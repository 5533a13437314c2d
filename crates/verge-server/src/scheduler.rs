//! Periodic auto-suggest driver.
//!
//! Runs the outcome-driven version suggestion on a fixed period. The run
//! itself audits and notifies through the orchestrator; this task only
//! schedules it.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time};
use verge_api::LifecycleStore;
use verge_core::{
  audit::AuditMeta,
  orchestrator::{Orchestrator, SuggestOutcome},
  store::Notifier,
};

pub fn spawn_auto_suggest<S, N>(
  orchestrator: Arc<Orchestrator<S, N>>,
  period: Duration,
) -> JoinHandle<()>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  tokio::spawn(async move {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a restart loop cannot
    // turn into a deploy loop.
    interval.tick().await;

    loop {
      interval.tick().await;
      let meta = AuditMeta {
        source: Some("scheduler".to_owned()),
        ..Default::default()
      };
      match orchestrator.auto_suggest(meta).await {
        Ok(SuggestOutcome::NoData) => {
          tracing::debug!("auto-suggest: no outcome data yet");
        }
        Ok(SuggestOutcome::KeepCurrent(label)) => {
          tracing::info!(%label, "auto-suggest: deployed version is still best");
        }
        Ok(SuggestOutcome::Deployed(version)) => {
          tracing::info!(label = %version.label, "auto-suggest: deployed new best version");
        }
        Err(e) => {
          tracing::error!("auto-suggest run failed: {e}");
        }
      }
    }
  })
}
