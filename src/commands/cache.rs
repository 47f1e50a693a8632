//! Liveness check for the backend's cache dependency.

use super::{settle, CallOutcome, NoParams};
use crate::bridge::{Bridge, Envelope, Operation};

pub struct CheckRedisConnection;

impl Operation for CheckRedisConnection {
    const NAME: &'static str = "check_redis_connection";
    type Params = NoParams;
    type Output = Envelope<String>;
}

/// Ask the backend whether its cache is reachable.
pub async fn check_redis_connection(bridge: &Bridge) -> CallOutcome<String> {
    let outcome = settle(
        CheckRedisConnection::NAME,
        bridge.call::<CheckRedisConnection>(&NoParams {}).await,
    );
    if let CallOutcome::Completed(Some(status)) = &outcome {
        tracing::info!(status = %status, "cache status");
    }
    outcome
}
