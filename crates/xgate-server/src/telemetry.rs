//! Tracing/logging setup: `RUST_LOG`-driven `EnvFilter`, falling back to
//! `info`, as the ambient observability stack every component logs
//! through via `tracing::{debug,info,warn,error}`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
