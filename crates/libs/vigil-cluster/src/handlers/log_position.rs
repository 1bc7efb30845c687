use serde_json::Value;

use crate::dispatch::{MethodResult, Origin, RpcMethod};

/// `log.setLogPosition` — fire-and-forget heartbeat.
///
/// Advances the acknowledged log position of the endpoint bound to the
/// originating connection. Positions only ever move forward; an older
/// value (a heartbeat overtaken by reconnect churn) is a no-op. Sessions
/// without a bound endpoint are ignored.
pub struct SetLogPosition;

impl RpcMethod for SetLogPosition {
    fn invoke(&self, origin: &Origin, params: Option<&Value>) -> MethodResult {
        let position = params
            .and_then(|params| params.get("log_position"))
            .and_then(Value::as_f64);
        let (Some(position), Some(endpoint)) = (position, origin.from_connection.endpoint())
        else {
            return Ok(Value::Null);
        };
        endpoint.advance_local_log_position(position);
        Ok(Value::Null)
    }
}
