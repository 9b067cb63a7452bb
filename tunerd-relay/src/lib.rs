//! Failover serving for channel streams
//!
//! Turns a channel id into a live byte stream: orders the channel's
//! mapped sources, walks them under strict time budgets, relays the first
//! one that answers, and quietly climbs back to a better source when one
//! recovers. Reads the mapping store, never writes it.

pub mod error;
pub mod relay;
pub mod selector;
pub mod service;
pub mod upstream;

pub use error::{StreamError, StreamResult};
pub use relay::RelayHandle;
pub use selector::{Candidate, FailoverSelector, Selection};
pub use service::{StreamHandle, StreamService};
pub use upstream::{HttpUpstreamClient, UpstreamClient, UpstreamStream};
