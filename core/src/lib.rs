//! A crate to relay APDU frames between a remote issuing service and a smart card.
//!
//! The remote service drives the conversation: it answers every request with a batch of
//! command frames (CAPDU), which are executed against the card one by one, and the response
//! frames (RAPDU) are posted back until the service stops sending commands.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cardrelay::mock::{MockCard, MockService};
//! use cardrelay::{CancelToken, Completion, Relay, RelayConfig, RequestTemplate};
//!
//! let service = MockService::new()
//!     .reply(r#"{"capdu":["00A4040000"]}"#)
//!     .reply(r#"{"titleList":{"cardName":"Demo"}}"#);
//! let card = MockCard::present().respond(vec![], 0x90, 0x00);
//!
//! let config = RelayConfig {
//!     settle_delay: Duration::ZERO,
//!     ..Default::default()
//! };
//! let mut relay = Relay::new(service, RequestTemplate::default(), config);
//! let outcome = relay.run(card, &CancelToken::new()).unwrap();
//!
//! assert_eq!(outcome.completion, Completion::Finished);
//! assert_eq!(outcome.rounds, 1);
//! ```

#[macro_use]
mod log;

#[cfg(feature = "pcsc")]
pub mod pcsc;

#[cfg(feature = "http")]
pub mod http;

pub mod cancel;
pub mod card;
pub mod frame;
pub mod mock;
pub mod protocol;
pub mod relay;
pub mod remote;

pub use cancel::CancelToken;
pub use card::{CardSession, CardTransport};
pub use frame::{CommandFrame, ResponseFrame};
pub use protocol::{Reply, RequestTemplate};
pub use relay::{Completion, Outcome, Relay, RelayConfig};
pub use remote::RemoteService;

/// Failure reported by a transport backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
