//! Events delivered by the host to a worker.
//!
//! Every event carries a deferral list: work registered with `wait_until`
//! must settle before the host treats the event as handled. Fetch events
//! additionally accept a single response future through `respond_with`.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, join_all};
use thiserror::Error;

use super::fetch::InterceptedRequest;
use crate::cache::CachedResponse;

pub(crate) type Deferred = BoxFuture<'static, ()>;
pub(crate) type ResponseFuture = BoxFuture<'static, Option<CachedResponse>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Install,
    Activate,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Activate => f.write_str("activate"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("a response was already registered for this fetch event")]
    AlreadyResponded,
}

/// Lifecycle event with a deferral list.
pub struct ExtendableEvent {
    kind: LifecycleKind,
    pending: Vec<Deferred>,
}

impl ExtendableEvent {
    pub fn new(kind: LifecycleKind) -> Self {
        Self {
            kind,
            pending: Vec::new(),
        }
    }

    pub fn install() -> Self {
        Self::new(LifecycleKind::Install)
    }

    pub fn activate() -> Self {
        Self::new(LifecycleKind::Activate)
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    /// Delay completion of this event until `task` settles.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(task.boxed());
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drive every deferred task to completion.
    pub async fn settle(self) {
        join_all(self.pending).await;
    }
}

/// Intercepted request awaiting a response.
pub struct FetchEvent {
    request: InterceptedRequest,
    response: Option<ResponseFuture>,
    deferred: Vec<Deferred>,
}

impl FetchEvent {
    pub fn new(request: InterceptedRequest) -> Self {
        Self {
            request,
            response: None,
            deferred: Vec::new(),
        }
    }

    pub fn request(&self) -> &InterceptedRequest {
        &self.request
    }

    /// Register the future producing this event's response. `None` from the
    /// future means the request ends without a response.
    pub fn respond_with<F>(&mut self, response: F) -> Result<(), EventError>
    where
        F: Future<Output = Option<CachedResponse>> + Send + 'static,
    {
        if self.response.is_some() {
            return Err(EventError::AlreadyResponded);
        }
        self.response = Some(response.boxed());
        Ok(())
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.deferred.push(task.boxed());
    }

    /// Split into the request, the registered response (if any) and the
    /// deferred work.
    pub(crate) fn into_parts(self) -> (InterceptedRequest, Option<ResponseFuture>, Vec<Deferred>) {
        (self.request, self.response, self.deferred)
    }
}
