//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Resource operations by outcome
    pub static ref OPERATIONS: CounterVec = register_counter_vec!(
        "resource_runtime_operations_total",
        "Total number of resource operations by outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Resource operation duration histogram
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "resource_runtime_operation_duration_seconds",
        "Duration of resource operations in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Informer events forwarded to the host
    pub static ref INFORMER_EVENTS: CounterVec = register_counter_vec!(
        "resource_runtime_informer_events_total",
        "Total number of informer events forwarded to the host",
        &["event"]
    ).unwrap();

    /// Currently running informer tasks
    pub static ref ACTIVE_INFORMERS: prometheus::IntGauge = prometheus::register_int_gauge!(
        "resource_runtime_active_informers",
        "Number of running connection informers"
    ).unwrap();

    /// Connection start attempts by resulting status
    pub static ref CONNECTION_STARTS: CounterVec = register_counter_vec!(
        "resource_runtime_connection_starts_total",
        "Total number of connection starts by resulting status",
        &["status"]
    ).unwrap();

    /// Runtime health (1 = healthy, 0 = unhealthy)
    pub static ref RUNTIME_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "resource_runtime_health",
        "Runtime health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    RUNTIME_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => health_response(),
        "/readyz" | "/ready" => ready_response(),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

fn health_response() -> Response<Full<Bytes>> {
    if RUNTIME_HEALTH.get() > 0.0 {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

fn ready_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "ok")
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
