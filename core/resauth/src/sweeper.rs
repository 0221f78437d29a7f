//! Background task expiring cached decisions and refreshing the bypass flag.
use std::sync::Arc;

use anyhow::Result;
use tokio::time::MissedTickBehavior;

use breakglass_context::Context;

use crate::BypassFlag;
use crate::ResourceAuthCache;

/// Periodically sweep the [`ResourceAuthCache`].
pub struct Sweeper {
    bypass: Arc<BypassFlag>,
    cache: Arc<ResourceAuthCache>,
    context: Context,
}

impl Sweeper {
    pub fn new(
        context: &Context,
        cache: Arc<ResourceAuthCache>,
        bypass: Arc<BypassFlag>,
    ) -> Sweeper {
        let context = context.derive_with(|log| log.log_values(slog::o!("task" => "sweeper")));
        Sweeper {
            bypass,
            cache,
            context,
        }
    }

    /// Sweep the cache on the configured interval until the task is dropped.
    pub async fn run(self) -> Result<()> {
        let period = self.cache.conf().sweep_interval();
        let start = crate::cache::expires_after(period);
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.cache.sweep(&self.context);
            if let Err(error) = self.bypass.refresh(&self.context).await {
                slog::warn!(
                    self.context.logger, "Unable to refresh resource authorisation bypass flag";
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use breakglass_context::Context;

    use super::Sweeper;
    use crate::BypassFlag;
    use crate::ResourceAuthCache;

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_interval() {
        let context = Context::fixture();
        let cache = Arc::new(ResourceAuthCache::new(Default::default()));
        cache.add(&context, "e", "R", false);
        let bypass = Arc::new(BypassFlag::fixture(false));
        let sweeper = Sweeper::new(&context, Arc::clone(&cache), bypass);
        let task = tokio::spawn(sweeper.run());

        // Denials expire after 5 minutes, the next sweep runs at 6 minutes.
        tokio::time::sleep(Duration::from_secs(5 * 60 + 30)).await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cache.len(), 0);
        task.abort();
    }
}
