//! # snmp-query
//!
//! Async SNMP v2c/v3 query engine with transparent subtree walking.
//!
//! One [`Client`] multiplexes any number of concurrent queries over a
//! single UDP socket, correlating out-of-order responses by request id.
//! A query is a single logical "get the value(s) at this identifier":
//! if the identifier names a scalar, one GET answers it; otherwise the
//! engine transparently falls back to a GETBULK walk over the subtree.
//! SNMPv3 sessions bootstrap themselves on first use (engine discovery
//! and time synchronization) and recover from remote restarts.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_query::{Auth, Client, oid};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_query::Error> {
//!     let client = Client::builder().open()?;
//!
//!     let mut results = client.get(
//!         "192.168.1.1:161".parse().unwrap(),
//!         Auth::community("public"),
//!         oid!(1, 3, 6, 1, 2, 1, 1),
//!     );
//!     while let Some(result) = results.next().await {
//!         println!("{}", result?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3
//!
//! ```rust,no_run
//! use snmp_query::{Auth, Client, oid};
//! use snmp_query::v3::{AuthProtocol, PrivProtocol, UsmCredentials};
//!
//! # async fn example() -> Result<(), snmp_query::Error> {
//! let client = Client::builder().open()?;
//! let credentials = UsmCredentials::new("admin")
//!     .auth(AuthProtocol::Sha1, "authpass123")
//!     .privacy(PrivProtocol::Aes128, "privpass123");
//!
//! let results = client
//!     .get(
//!         "192.168.1.1:161".parse().unwrap(),
//!         Auth::usm(credentials),
//!         oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
//!     )
//!     .collect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod ber;
pub mod client;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod transport;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

// Re-exports for convenience
pub use client::{
    Auth, Client, ClientBuilder, ClientConfig, QueryRequest, QueryStream, RequestId,
    RequestIdProvider, TimedQuery,
};
pub use error::{DecodeErrorKind, Error, OidErrorKind, Result};
pub use oid::Oid;
pub use pdu::{Pdu, PduType};
pub use transport::{DatagramTransport, UdpTransport};
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
