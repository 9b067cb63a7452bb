//! Postgres-backed store implementations
//!
//! Each repository owns a `PgPool` clone and implements one of the store
//! traits from [`crate::store`]. Schema is managed externally via sqlx
//! migrations.

pub mod account;
pub mod channel;
pub mod event_log;
pub mod mapping;
pub mod source;

pub use account::AccountRepository;
pub use channel::ChannelRepository;
pub use event_log::EventLogRepository;
pub use mapping::MappingRepository;
pub use source::SourceRepository;
