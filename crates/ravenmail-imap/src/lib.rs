//! # ravenmail-imap
//!
//! An async IMAP client engine (RFC 3501 with RFC 9051 conveniences):
//! wire framing and parsing, command correlation, a listener-based
//! dispatch path for untagged responses, pooled sessions, IDLE, SASL
//! authentication, and configurable transport establishment (implicit
//! TLS, STARTTLS, HTTP CONNECT and SOCKS5 proxies).
//!
//! ## Layers
//!
//! - [`parser`]: tokenizer and response parser, sans I/O
//! - [`command`]: command builders and wire serialization
//! - [`conn`]: transport, framing, the connection driver, and IDLE
//! - [`net`]: socket establishment, proxy tunneling, TLS policy
//! - [`dispatch`]: untagged-response listeners and the folder view
//! - [`pool`]: bounded connection pool
//! - [`store`]: the high-level [`Store`]/[`Folder`] session API
//!
//! ## Quick Start
//!
//! ```ignore
//! use ravenmail_imap::{Config, FetchItems, SequenceSet, Store};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ravenmail_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .credentials("user@example.com", "password")
//!         .build();
//!     let store = Store::connect(config).await?;
//!
//!     let inbox = store.folder("INBOX");
//!     let status = inbox.open(false).await?;
//!     println!("{} messages", status.exists);
//!
//!     let headers = inbox
//!         .fetch(SequenceSet::range(1, 10).unwrap(), FetchItems::Fast, false)
//!         .await?;
//!     println!("fetched {}", headers.len());
//!
//!     // Block until the server pushes something, up to 29 minutes.
//!     let event = inbox.idle(Duration::from_secs(29 * 60)).await?;
//!     println!("{event:?}");
//!
//!     store.close().await
//! }
//! ```
//!
//! Untagged responses read on any connection flow through that
//! connection's [`dispatch::Dispatcher`] before the command that was in
//! flight returns, so a registered [`dispatch::ResponseListener`] (the
//! built-in [`dispatch::FolderState`] included) never misses an update.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod conn;
pub mod dispatch;
mod error;
pub mod net;
pub mod parser;
pub mod pool;
pub mod store;
pub mod types;

pub use command::{
    Command, FetchAttribute, FetchItems, SearchCriteria, StatusAttribute, StoreAction,
    TagGenerator,
};
pub use conn::config::{Config, ConfigBuilder, ProxyConfig, Security, TlsVersion};
pub use conn::driver::{CommandResult, ConnState, ImapConnection};
pub use conn::framed::FramedStream;
pub use conn::idle::{IdleEvent, IdleInterrupter, IdleSession};
pub use conn::stream::ImapStream;
pub use dispatch::{
    CollectingListener, Dispatch, Dispatcher, FolderState, LoggingListener, ResponseListener,
};
pub use error::{Error, Result};
pub use parser::response::{
    Data, FetchItem, Response, ResponseParser, StatusItem, UntaggedResponse,
};
pub use pool::{ConnectionPool, PooledConnection};
pub use store::{Folder, Store};
pub use types::{
    Capability, Flag, Flags, ListEntry, MailboxStatus, ResponseCode, SeqNum, SequenceSet, Status,
    Tag, Uid, UidValidity,
};
