pub mod id;
pub mod account;
pub mod channel;
pub mod source;
pub mod mapping;
pub mod changeset;
pub mod event;

pub use id::{generate_id, AccountId, ChannelId, MappingId, SourceId};
pub use account::Account;
pub use channel::Channel;
pub use source::{ScannedSource, Source};
pub use mapping::Mapping;
pub use changeset::{ChangeSet, SourceChange};
pub use event::{EventCategory, EventDetails, EventLevel, EventLogEntry, ReasonCode};
