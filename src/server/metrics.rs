use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::error;

const PREFIX: &str = "encore";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_http_requests_total", PREFIX),
            "Total HTTP requests by method, path and status",
        ),
        &["method", "path", "status"],
    )
    .unwrap();

    static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{}_http_request_duration_seconds", PREFIX),
            "HTTP request duration by method and path",
        ),
        &["method", "path"],
    )
    .unwrap();

    static ref VOTE_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_vote_events_total", PREFIX),
            "Vote change events processed by type and outcome",
        ),
        &["event_type", "status"],
    )
    .unwrap();

    static ref VOTE_EVENT_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{}_vote_event_duration_seconds", PREFIX),
            "End-to-end vote event processing duration",
        ),
        &["event_type"],
    )
    .unwrap();

    static ref ALERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_alerts_total", PREFIX),
            "Anomaly alerts raised by kind",
        ),
        &["kind"],
    )
    .unwrap();

    static ref SNAPSHOT_UPSERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_snapshot_upserts_total", PREFIX),
            "Trending snapshot writes by entity type",
        ),
        &["entity_type"],
    )
    .unwrap();

    static ref WS_ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        format!("{}_ws_active_connections", PREFIX),
        "Currently open websocket connections",
    )
    .unwrap();

    static ref BROADCAST_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_broadcast_messages_total", PREFIX),
            "Vote update broadcasts by delivery outcome",
        ),
        &["status"],
    )
    .unwrap();

    static ref BACKGROUND_JOB_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            format!("{}_background_job_runs_total", PREFIX),
            "Background job executions by job and outcome",
        ),
        &["job_id", "status"],
    )
    .unwrap();

    static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{}_background_job_duration_seconds", PREFIX),
            "Background job execution duration",
        ),
        &["job_id"],
    )
    .unwrap();

    static ref BACKGROUND_JOB_RUNNING: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            format!("{}_background_job_running", PREFIX),
            "Whether a background job is currently executing",
        ),
        &["job_id"],
    )
    .unwrap();

    static ref CATALOG_ARTISTS: IntGauge = IntGauge::new(
        format!("{}_catalog_artists", PREFIX),
        "Artists in the catalog",
    )
    .unwrap();

    static ref CATALOG_SHOWS: IntGauge = IntGauge::new(
        format!("{}_catalog_shows", PREFIX),
        "Shows in the catalog",
    )
    .unwrap();

    static ref CATALOG_SETLIST_SONGS: IntGauge = IntGauge::new(
        format!("{}_catalog_setlist_songs", PREFIX),
        "Setlist songs in the catalog",
    )
    .unwrap();
}

pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(VOTE_EVENTS_TOTAL.clone()),
        Box::new(VOTE_EVENT_DURATION_SECONDS.clone()),
        Box::new(ALERTS_TOTAL.clone()),
        Box::new(SNAPSHOT_UPSERTS_TOTAL.clone()),
        Box::new(WS_ACTIVE_CONNECTIONS.clone()),
        Box::new(BROADCAST_MESSAGES_TOTAL.clone()),
        Box::new(BACKGROUND_JOB_RUNS_TOTAL.clone()),
        Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()),
        Box::new(BACKGROUND_JOB_RUNNING.clone()),
        Box::new(CATALOG_ARTISTS.clone()),
        Box::new(CATALOG_SHOWS.clone()),
        Box::new(CATALOG_SETLIST_SONGS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            error!("Failed to register metrics collector: {}", e);
        }
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_vote_event(event_type: &str, status: &str, duration_secs: f64) {
    VOTE_EVENTS_TOTAL
        .with_label_values(&[event_type, status])
        .inc();
    VOTE_EVENT_DURATION_SECONDS
        .with_label_values(&[event_type])
        .observe(duration_secs);
}

pub fn record_alert(kind: &str) {
    ALERTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_snapshot_upsert(entity_type: &str) {
    SNAPSHOT_UPSERTS_TOTAL
        .with_label_values(&[entity_type])
        .inc();
}

pub fn ws_connection_opened() {
    WS_ACTIVE_CONNECTIONS.inc();
}

pub fn ws_connection_closed() {
    WS_ACTIVE_CONNECTIONS.dec();
}

pub fn record_broadcast(sent: usize, failed: usize) {
    if sent > 0 {
        BROADCAST_MESSAGES_TOTAL
            .with_label_values(&["sent"])
            .inc_by(sent as u64);
    }
    if failed > 0 {
        BROADCAST_MESSAGES_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
    }
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1 } else { 0 });
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration_secs: f64) {
    BACKGROUND_JOB_RUNS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration_secs);
}

pub fn set_catalog_counts(artists: usize, shows: usize, setlist_songs: usize) {
    CATALOG_ARTISTS.set(artists as i64);
    CATALOG_SHOWS.set(shows as i64);
    CATALOG_SETLIST_SONGS.set(setlist_songs as i64);
}

pub async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}
