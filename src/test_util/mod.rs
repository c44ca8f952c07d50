use std::{
    convert::Infallible,
    net::{SocketAddr, TcpListener},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{TimeZone, Utc};
use hyper::{
    Body, Request, Response, Server,
    service::{make_service_fn, service_fn},
};

use crate::event::{LabelSet, MetricSample};

mod mock;

pub use mock::{Call, CallLog, MockSink, MockSource};

pub fn trace_init() {
    #[cfg(unix)]
    let color = {
        use std::io::IsTerminal;
        std::io::stdout().is_terminal()
    };
    #[cfg(not(unix))]
    let color = false;

    let levels = std::env::var("TEST_LOG").unwrap_or_else(|_| "error".to_owned());

    crate::trace::init(color, false, &levels);
}

/// `count` samples one minute apart, each valued by its index.
pub fn samples(count: usize) -> Vec<MetricSample> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|index| MetricSample {
            labels: LabelSet::from([("instance".to_owned(), format!("host-{}", index % 3))]),
            value: index as f64,
            timestamp: start + chrono::Duration::minutes(index as i64),
            step_size: Duration::from_secs(60),
        })
        .collect()
}

/// A table name no other test uses.
pub fn random_table_name() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    format!(
        "metering_test_{}_{}_{}",
        std::process::id(),
        nanos,
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

/// Serves every request with `handler` on an ephemeral local port.
pub async fn spawn_http_server<F>(handler: F) -> SocketAddr
where
    F: Fn(Request<Body>) -> Response<Body> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handler = Arc::new(handler);
    let make_service = make_service_fn(move |_| {
        let handler = Arc::clone(&handler);
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let response = (*handler)(request);
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });

    let server = Server::from_tcp(listener).unwrap().serve(make_service);
    tokio::spawn(async move {
        if let Err(error) = server.await {
            error!(message = "Test HTTP server failed.", %error);
        }
    });

    addr
}
