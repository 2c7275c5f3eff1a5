use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("agent_gateway_requests_total", "Total number of agent-test requests").unwrap();
    pub static ref AUTH_FAILURES: Counter =
        register_counter!("agent_gateway_auth_failures_total", "Requests rejected for missing or invalid sessions").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("agent_gateway_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("agent_gateway_upstream_failures_total", "Failed calls to the generative model").unwrap();
    pub static ref EMPTY_GENERATIONS: Counter =
        register_counter!("agent_gateway_empty_generations_total", "Model calls that returned no candidate text").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "agent_gateway_upstream_latency_seconds",
        "Generative model call latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge =
        register_gauge!("agent_gateway_rate_limit_entries", "Current number of tracked callers").unwrap();
}

// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
