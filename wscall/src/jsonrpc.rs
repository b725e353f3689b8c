//! JSON-RPC 2.0 on top of [`Client`].
//!
//! Requests carry a per-client sequence number as a string id. Because only
//! one call is in flight at a time, responses are matched positionally; the
//! id is informational. Inbound messages with a `method` member are
//! notifications and are routed to a callback instead of the waiting caller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::Client;
use crate::config::{ClientConfig, Endpoint};
use crate::error::{Error, Result};
use crate::handler::InboundHandler;
use crate::handoff::Handoff;
use crate::transport::Transport;

/// Subscription id sent with every `register`/`unregister` call.
pub const EVENT_SUBSCRIPTION_ID: &str = "client.events.1";

#[derive(Serialize, Debug)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded response message.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(RpcError { code, message, .. }) => Err(Error::Rpc { code, message }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// True if `message` is a notification (it names a `method`) rather than a
/// response to a call.
pub fn is_event(message: &str) -> bool {
    match serde_json::from_str::<Value>(message) {
        Ok(Value::Object(map)) => match map.get("method") {
            Some(Value::Null) | None => false,
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        },
        _ => false,
    }
}

/// A subscription call succeeded iff its result is numerically zero.
fn subscription_accepted(response: &Response) -> bool {
    response.result.as_ref().and_then(Value::as_f64) == Some(0.0)
}

/// Routes notifications to `on_event` and everything else to the caller
/// blocked in [`Client::call`].
pub struct JsonRpcHandler<F> {
    handoff: Option<Arc<Handoff<String>>>,
    on_event: F,
}

impl<F> JsonRpcHandler<F>
where
    F: FnMut(&str) + Send,
{
    pub fn new(on_event: F) -> Self {
        JsonRpcHandler {
            handoff: None,
            on_event,
        }
    }
}

impl<F> fmt::Debug for JsonRpcHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcHandler")
            .field("attached", &self.handoff.is_some())
            .finish()
    }
}

impl<F> InboundHandler for JsonRpcHandler<F>
where
    F: FnMut(&str) + Send,
{
    fn attach(&mut self, handoff: Arc<Handoff<String>>) {
        self.handoff = Some(handoff);
    }

    fn handle(&mut self, payload: &str) {
        if serde_json::from_str::<Value>(payload).is_err() {
            warn!(len = payload.len(), "dropping malformed JSON-RPC message");
            return;
        }
        if is_event(payload) {
            (self.on_event)(payload);
        } else if let Some(ref handoff) = self.handoff {
            handoff.offer(payload.to_string());
        }
    }
}

/// JSON-RPC client over a reconnecting WebSocket session.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Wraps a client whose inbound handler is a [`JsonRpcHandler`].
    pub fn new(client: Client) -> Self {
        JsonRpcClient {
            client,
            next_id: AtomicU64::new(1),
        }
    }

    /// Connects to `endpoint`, sending notifications to `on_event`.
    pub fn connect<T, F>(
        endpoint: Endpoint,
        transport: T,
        on_event: F,
        config: ClientConfig,
    ) -> Result<Self>
    where
        T: Transport,
        F: FnMut(&str) + Send + 'static,
    {
        let client = Client::connect(endpoint, transport, JsonRpcHandler::new(on_event), config)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Builds the request text for `method`, consuming the next id.
    pub fn format_request(&self, method: &str, params: Option<&Value>) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: "2.0",
            id: id.to_string(),
            method,
            params,
        };
        Ok(serde_json::to_string(&request)?)
    }

    /// Calls `method` and returns the raw response text.
    pub fn call_raw(&self, method: &str, params: Option<Value>) -> Result<String> {
        let request = self.format_request(method, params.as_ref())?;
        debug!(method, "calling");
        self.client.call(request)
    }

    /// Calls `method` and returns its `result`, or the `error` it reported.
    pub fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let response = self.call_raw(method, params)?;
        let response: Response = serde_json::from_str(&response)?;
        response.into_result()
    }

    /// Subscribes to `event` of `object`. Returns whether the service accepted.
    pub fn register_event(&self, object: &str, event: &str) -> Result<bool> {
        self.subscription(object, "register", event)
    }

    pub fn unregister_event(&self, object: &str, event: &str) -> Result<bool> {
        self.subscription(object, "unregister", event)
    }

    fn subscription(&self, object: &str, action: &str, event: &str) -> Result<bool> {
        let method = format!("{}.{}", object, action);
        let params = json!({ "event": event, "id": EVENT_SUBSCRIPTION_ID });
        let response: Response = serde_json::from_str(&self.call_raw(&method, Some(params))?)?;
        Ok(subscription_accepted(&response))
    }

    pub fn close(self) -> Result<()> {
        self.client.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_is_event() {
        assert!(is_event(
            r#"{"jsonrpc":"2.0","method":"player.onStateChanged","params":{}}"#
        ));
        assert!(!is_event(r#"{"jsonrpc":"2.0","id":"1","result":0}"#));
        assert!(!is_event(r#"{"jsonrpc":"2.0","id":"1","method":null}"#));
        assert!(!is_event(r#"{"jsonrpc":"2.0","method":[]}"#));
        assert!(!is_event(r#"{"jsonrpc":"2.0","method":{}}"#));
        assert!(is_event(r#"{"jsonrpc":"2.0","method":""}"#));
        assert!(!is_event("not json"));
        assert!(!is_event("[1,2]"));
    }

    #[test]
    fn test_request_format() {
        let request = Request {
            jsonrpc: "2.0",
            id: 7.to_string(),
            method: "player.play",
            params: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"jsonrpc":"2.0","id":"7","method":"player.play"}"#
        );

        let params = json!({"uri": "dvb://1.2.3"});
        let request = Request {
            params: Some(&params),
            ..request
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"jsonrpc":"2.0","id":"7","method":"player.play","params":{"uri":"dvb://1.2.3"}}"#
        );
    }

    #[test]
    fn test_response_into_result() {
        let ok: Response = serde_json::from_str(r#"{"jsonrpc":"2.0","id":"1","result":{"a":1}}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!({"a": 1}));

        let err: Response = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        match err.into_result() {
            Err(Error::Rpc { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn test_subscription_accepted() {
        let accepted = |text: &str| {
            subscription_accepted(&serde_json::from_str::<Response>(text).unwrap())
        };
        assert!(accepted(r#"{"jsonrpc":"2.0","id":"1","result":0}"#));
        assert!(accepted(r#"{"jsonrpc":"2.0","id":"1","result":0.0}"#));
        assert!(!accepted(r#"{"jsonrpc":"2.0","id":"1","result":1}"#));
        assert!(!accepted(r#"{"jsonrpc":"2.0","id":"1","result":"0"}"#));
        assert!(!accepted(
            r#"{"jsonrpc":"2.0","id":"1","error":{"code":-1,"message":"no"}}"#
        ));
    }

    #[test]
    fn test_handler_routes_events_and_responses() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut handler = {
            let events = events.clone();
            JsonRpcHandler::new(move |e: &str| events.lock().unwrap().push(e.to_string()))
        };
        let handoff = Arc::new(Handoff::new());
        handler.attach(handoff.clone());

        handler.handle(r#"{"jsonrpc":"2.0","method":"tuner.onChannelChanged"}"#);
        handler.handle("garbage");
        assert!(handoff.is_empty());
        handler.handle(r#"{"jsonrpc":"2.0","id":"3","result":0}"#);

        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(handoff.take(), r#"{"jsonrpc":"2.0","id":"3","result":0}"#);
    }
}
