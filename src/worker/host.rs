//! Bridges a host's event delivery to a `WorkerHandler`.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::events::{ExtendableEvent, FetchEvent, LifecycleKind};
use super::fetch::{Fetcher, InterceptedRequest};
use super::handler::WorkerHandler;
use crate::cache::CachedResponse;

/// Delivers `install`, `activate` and `fetch` events and waits for the
/// work each handler registers on them.
#[derive(Clone)]
pub struct WorkerHost {
    handler: Arc<dyn WorkerHandler>,
    network: Arc<dyn Fetcher>,
}

impl WorkerHost {
    /// `network` answers fetch events the handler declines to respond to.
    pub fn new(handler: Arc<dyn WorkerHandler>, network: Arc<dyn Fetcher>) -> Self {
        Self { handler, network }
    }

    pub async fn install(&self) {
        self.lifecycle(LifecycleKind::Install).await;
    }

    pub async fn activate(&self) {
        self.lifecycle(LifecycleKind::Activate).await;
    }

    async fn lifecycle(&self, kind: LifecycleKind) {
        let mut event = ExtendableEvent::new(kind);
        match kind {
            LifecycleKind::Install => self.handler.on_install(&mut event),
            LifecycleKind::Activate => self.handler.on_activate(&mut event),
        }
        let pending = event.pending();
        event.settle().await;
        info!(event = %kind, pending, "lifecycle event handled");
    }

    /// Deliver a fetch event. `None` means the request ended without a
    /// response.
    pub async fn fetch(&self, request: InterceptedRequest) -> Option<CachedResponse> {
        let mut event = FetchEvent::new(request);
        self.handler.on_intercept(&mut event);

        let (request, response, deferred) = event.into_parts();
        let response = match response {
            Some(response) => response.await,
            None => {
                debug!(url = %request.url, "handler did not respond; using network");
                match self.network.fetch(request).await {
                    Ok(response) => Some(response),
                    Err(err) => {
                        warn!(error = %err, "network fallback failed");
                        None
                    }
                }
            }
        };

        join_all(deferred).await;
        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::worker::fetch::FetchError;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<&'static str>>,
        deferred_ran: Arc<AtomicUsize>,
        respond: bool,
    }

    impl WorkerHandler for Recording {
        fn on_install(&self, event: &mut ExtendableEvent) {
            self.events.lock().unwrap().push("install");
            let ran = Arc::clone(&self.deferred_ran);
            event.wait_until(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        fn on_activate(&self, _event: &mut ExtendableEvent) {
            self.events.lock().unwrap().push("activate");
        }

        fn on_intercept(&self, event: &mut FetchEvent) {
            self.events.lock().unwrap().push("fetch");
            if self.respond {
                event
                    .respond_with(async { Some(CachedResponse::new(200, "from handler")) })
                    .unwrap();
            }
        }
    }

    struct Network(u16);

    #[async_trait]
    impl Fetcher for Network {
        async fn fetch(&self, request: InterceptedRequest) -> Result<CachedResponse, FetchError> {
            match self.0 {
                0 => Err(FetchError::network(&request.url, "offline")),
                status => Ok(CachedResponse::new(status, "from network")),
            }
        }
    }

    fn request() -> InterceptedRequest {
        InterceptedRequest::get(Url::parse("http://origin.test/a.json").unwrap())
    }

    #[tokio::test]
    async fn lifecycle_events_wait_for_deferred_work() {
        let handler = Arc::new(Recording::default());
        let host = WorkerHost::new(handler.clone(), Arc::new(Network(200)));

        host.install().await;
        host.activate().await;

        assert_eq!(*handler.events.lock().unwrap(), vec!["install", "activate"]);
        assert_eq!(handler.deferred_ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_response_wins() {
        let handler = Arc::new(Recording {
            respond: true,
            ..Default::default()
        });
        let host = WorkerHost::new(handler, Arc::new(Network(200)));

        let response = host.fetch(request()).await.expect("response");
        assert_eq!(response.body, "from handler");
    }

    #[tokio::test]
    async fn unanswered_fetch_falls_through_to_network() {
        let host = WorkerHost::new(Arc::new(Recording::default()), Arc::new(Network(200)));

        let response = host.fetch(request()).await.expect("response");
        assert_eq!(response.body, "from network");
    }

    #[tokio::test]
    async fn unanswered_fetch_with_network_failure_has_no_response() {
        let host = WorkerHost::new(Arc::new(Recording::default()), Arc::new(Network(0)));

        assert!(host.fetch(request()).await.is_none());
    }
}
