//!Synchronous request/response calls over a persistent, self-healing WebSocket.
//!
//!A [`Client`] owns one logical connection to an [`Endpoint`]. A background
//!watchdog thread opens the connection, runs the transport's event loop, and
//!reconnects whenever the connection drops. The caller just sees blocking
//!calls:
//!
//!```rust,no_run
//!use wscall::{Client, ClientConfig, Endpoint, ResponseHandler, WebSocketTransport};
//!
//!# fn main() -> wscall::Result<()> {
//!let client = Client::connect(
//!    Endpoint::new("127.0.0.1", 8910, "rpc", "/service"),
//!    WebSocketTransport::new(),
//!    ResponseHandler::new(),
//!    ClientConfig::default(),
//!)?;
//!
//!let response = client.call(r#"{"jsonrpc":"2.0","id":"1","method":"system.ping"}"#)?;
//!println!("{}", response);
//!client.close()?;
//!# Ok(())
//!# }
//!```
//!
//!Outbound messages go out in exactly the order they were sent. If the
//!transport is not writable yet, they wait in a FIFO queue that drains one
//!message per writable notification. An inbound message is passed to the
//![`InboundHandler`], which decides whether it answers the pending call (by
//!offering it to the session's [`Handoff`]) or is something else entirely.
//!
//!Only one call is in flight at a time. Responses are matched by position,
//!not by id.
//!
//!For JSON-RPC services, [`jsonrpc::JsonRpcClient`] formats requests and
//!separates notifications from responses:
//!
//!```rust,no_run
//!use wscall::jsonrpc::JsonRpcClient;
//!use wscall::{ClientConfig, Endpoint, WebSocketTransport};
//!
//!# fn main() -> wscall::Result<()> {
//!let rpc = JsonRpcClient::connect(
//!    Endpoint::new("127.0.0.1", 8910, "rpc", "/service"),
//!    WebSocketTransport::new(),
//!    |event: &str| println!("event: {}", event),
//!    ClientConfig::default(),
//!)?;
//!
//!if rpc.register_event("player", "onStateChanged")? {
//!    let state = rpc.call("player.getState", None)?;
//!    println!("{}", state);
//!}
//!# Ok(())
//!# }
//!```
//!
//!Other transports plug in through the traits in [`transport`].

#![deny(unsafe_code)]

mod client;
mod config;
mod dispatcher;
mod error;
mod handler;
mod handoff;
pub mod jsonrpc;
mod session;
pub mod transport;
mod watchdog;
mod websocket;


pub use crate::client::Client;
pub use crate::config::{ClientConfig, Endpoint, ReconnectPolicy};
pub use crate::error::{Error, Result};
pub use crate::handler::{InboundHandler, ResponseHandler};
pub use crate::handoff::Handoff;
pub use crate::session::{ConnectionState, Session};
pub use crate::watchdog::Watchdog;
pub use crate::websocket::WebSocketTransport;
