//! # Heartbeat
//!
//! Once a second, report the agent's name and in-flight count to the
//! orchestrator. A failed delivery is logged and the ticker carries on; the
//! orchestrator ages this worker out of dispatch capacity after a minute of
//! silence.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use dcalc_shared::messaging::HeartbeatPayload;

pub async fn run(
    orchestrator_url: String,
    worker_name: String,
    interval: Duration,
    in_flight: Arc<AtomicI64>,
) {
    let client = reqwest::Client::new();
    let endpoint = format!("{orchestrator_url}/getHearthbeat");
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let payload = HeartbeatPayload {
            worker_name: worker_name.clone(),
            in_flight_count: in_flight.load(Ordering::SeqCst),
        };
        match client.post(&endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(in_flight = payload.in_flight_count, "heartbeat delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "heartbeat rejected");
            }
            Err(error) => {
                warn!(%error, "heartbeat delivery failed");
            }
        }
    }
}
