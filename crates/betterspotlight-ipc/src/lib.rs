//! IPC transport: length-prefixed JSON messages over local stream sockets.
//!
//! Wire format: `u32 big-endian length | UTF-8 JSON object`. Four message
//! shapes (request, response, error, notification) and the nine canonical
//! error codes are shared by every service.

pub mod client;
pub mod codec;
pub mod message;
pub mod server;
pub mod service;

pub use client::{ClientEvent, SocketClient};
pub use codec::{decode, encode, Decoded};
pub use server::{RequestHandler, SocketServer};
pub use service::{pid_path, socket_path, ServiceRunner};
