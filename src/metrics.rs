use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gate_requests_total", "Total number of requests seen by admission control").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("gate_admitted_total", "Requests forwarded downstream").unwrap();
    pub static ref REJECTED_TOTAL: Counter =
        register_counter!("gate_rejected_total", "Requests rejected with 429").unwrap();
    pub static ref EVICTED_TOTAL: Counter =
        register_counter!("gate_sessions_evicted_total", "Idle client sessions removed by the sweeper").unwrap();
    pub static ref SESSIONS: Gauge =
        register_gauge!("gate_sessions", "Current number of tracked client sessions").unwrap();
    pub static ref ADMISSION_LATENCY: Histogram = register_histogram!(
        "gate_admission_latency_seconds",
        "Time spent deciding admission, grace wait included"
    )
    .unwrap();
}

// Render the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
