mod middleware;
mod proxy;

pub use middleware::RequestContext;
pub use proxy::{ProxyState, build_router, origin_url};
