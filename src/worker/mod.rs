//! Request-interception worker.
//!
//! A host delivers three events: `install` and `activate` once per worker
//! version, and `fetch` for every intercepted request. `ReadThroughWorker`
//! answers fetches from the cache store first and the network second, and
//! purges every namespace on activation so a new version never serves
//! responses cached by an older one.

mod events;
mod fetch;
mod handler;
mod host;
mod lifecycle;
mod population;

pub use events::{EventError, ExtendableEvent, FetchEvent, LifecycleKind};
pub use fetch::{FetchError, Fetcher, HttpFetcher, InterceptedRequest, RetryingFetcher};
pub use handler::{Interception, ReadThroughWorker, WorkerHandler, is_storable};
pub use host::WorkerHost;
pub use lifecycle::{PrecacheFailure, PrecacheReport, PurgeReport, precache, purge_all};
pub use population::PopulationTasks;
