use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::types::{CrawlEvent, CrawlEventType, EventLevel, RunId, SubjectId};

/// An event plus whether the recorder should persist it.
#[derive(Clone, Debug)]
pub struct PublishedEvent {
    pub event: CrawlEvent,
    pub persist: bool,
}

/// In-process fan-out of crawl events. Live streams and the persisting
/// recorder are independent subscribers.
#[derive(Clone, Debug)]
pub struct CrawlEventBus {
    sender: broadcast::Sender<PublishedEvent>,
}

impl CrawlEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CrawlEvent, persist: bool) {
        // No subscribers is fine.
        let _ = self.sender.send(PublishedEvent { event, persist });
    }
}

impl Default for CrawlEventBus {
    fn default() -> Self {
        Self::new(1_024)
    }
}

/// Events of `run_id` from `receiver`, ending after `run_finished`, when the
/// bus closes, or once `finished` is cancelled and nothing buffered is left.
/// The last case covers a `run_finished` lost to lag. Subscribe before the
/// run starts or early events are lost.
pub fn run_events(
    receiver: broadcast::Receiver<PublishedEvent>,
    run_id: RunId,
    finished: CancellationToken,
) -> BoxStream<'static, CrawlEvent> {
    futures::stream::unfold(Some((receiver, finished)), move |state| async move {
        let (mut receiver, finished) = state?;
        loop {
            let received = tokio::select! {
                biased;
                received = receiver.recv() => received,
                () = finished.cancelled() => {
                    debug!(target: "crawl", %run_id, "run ended without a buffered run_finished");
                    return None;
                }
            };
            match received {
                Ok(published) if published.event.run_id == run_id => {
                    let done = published.event.is_terminal();
                    return Some((
                        published.event,
                        (!done).then_some((receiver, finished)),
                    ));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "crawl", %run_id, skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// Publishes the events of one run and mirrors them into tracing.
#[derive(Clone, Debug)]
pub struct RunEmitter {
    bus: CrawlEventBus,
    clock: Arc<dyn Clock>,
    run_id: RunId,
    job: &'static str,
    persist: bool,
}

impl RunEmitter {
    pub fn new(
        bus: CrawlEventBus,
        clock: Arc<dyn Clock>,
        run_id: RunId,
        job: &'static str,
        persist: bool,
    ) -> Self {
        Self {
            bus,
            clock,
            run_id,
            job,
            persist,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn emit(
        &self,
        level: EventLevel,
        event_type: CrawlEventType,
        subject_id: Option<&SubjectId>,
        message: Option<String>,
        meta: Option<Value>,
    ) {
        let subject = subject_id.map(|s| s.as_str()).unwrap_or("-");
        let text = message.as_deref().unwrap_or("");
        match level {
            EventLevel::Info => info!(
                target: "crawl",
                job = self.job,
                run_id = %self.run_id,
                event = %event_type,
                subject,
                "{text}"
            ),
            EventLevel::Warn => warn!(
                target: "crawl",
                job = self.job,
                run_id = %self.run_id,
                event = %event_type,
                subject,
                "{text}"
            ),
            EventLevel::Error => error!(
                target: "crawl",
                job = self.job,
                run_id = %self.run_id,
                event = %event_type,
                subject,
                "{text}"
            ),
        }

        self.bus.publish(
            CrawlEvent {
                run_id: self.run_id,
                level,
                event_type,
                subject_id: subject_id.cloned(),
                message,
                meta,
                created_at: self.clock.now(),
            },
            self.persist,
        );
    }

    pub fn info(
        &self,
        event_type: CrawlEventType,
        subject_id: Option<&SubjectId>,
        message: Option<String>,
        meta: Option<Value>,
    ) {
        self.emit(EventLevel::Info, event_type, subject_id, message, meta);
    }
}
