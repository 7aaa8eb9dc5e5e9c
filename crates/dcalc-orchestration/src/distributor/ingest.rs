//! # Result Ingest Loop
//!
//! Permanent subscription to the `results` channel. Each received payload
//! writes the result column of its operation and nothing else: RUNNING with
//! a result present is the "completed but not promoted" state the promotion
//! loop scans for. Writes are idempotent per operation (last write wins),
//! which absorbs duplicate executions under at-least-once dispatch.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info, warn};

use dcalc_shared::errors::DcalcResult;
use dcalc_shared::messaging::{ResultPayload, RESULTS_CHANNEL};
use dcalc_shared::models::Operation;
use dcalc_shared::SystemContext;

pub async fn run(context: Arc<SystemContext>) {
    match subscribe_and_ingest(&context).await {
        Ok(()) => error!("results subscription ended unexpectedly, ingest halted"),
        Err(err) => error!(error = %err, "results subscription lost, ingest halted"),
    }
}

async fn subscribe_and_ingest(context: &SystemContext) -> DcalcResult<()> {
    let mut pubsub = context.broker().subscribe(RESULTS_CHANNEL).await?;
    info!(channel = RESULTS_CHANNEL, "ingest subscribed");
    let mut stream = pubsub.on_message();

    while let Some(message) = stream.next().await {
        let payload = match message
            .get_payload::<String>()
            .map_err(dcalc_shared::DcalcError::from)
            .and_then(|raw| Ok(serde_json::from_str::<ResultPayload>(&raw)?))
        {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "discarding malformed result payload");
                continue;
            }
        };

        match Operation::set_result(
            context.database_pool(),
            payload.operation_id,
            payload.result,
        )
        .await
        {
            Ok(()) => info!(
                operation_id = %payload.operation_id,
                result = payload.result,
                "ingested operation result"
            ),
            Err(error) => warn!(
                operation_id = %payload.operation_id,
                %error,
                "failed to store operation result"
            ),
        }
    }
    Ok(())
}
