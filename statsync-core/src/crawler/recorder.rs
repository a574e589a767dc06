use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::CrawlEventBus;
use crate::database::ports::CrawlEventRepository;

/// Background subscriber that stores events published with `persist = true`.
#[derive(Debug)]
pub struct CrawlEventRecorder;

impl CrawlEventRecorder {
    /// Runs until every bus sender is dropped.
    pub fn spawn(
        bus: &CrawlEventBus,
        repo: Arc<dyn CrawlEventRepository>,
    ) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(published) if published.persist => {
                        if let Err(err) = repo.insert(&published.event).await {
                            warn!(
                                target: "crawl",
                                run_id = %published.event.run_id,
                                error = %err,
                                "failed to persist crawl event"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "crawl", skipped, "event recorder lagged, events were not persisted");
                    }
                    Err(RecvError::Closed) => {
                        debug!(target: "crawl", "event bus closed, recorder stopping");
                        break;
                    }
                }
            }
        })
    }
}
