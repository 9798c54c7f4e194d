pub mod codec;
mod config;
mod error;
mod key_value;
mod listing;
mod mutation;
mod session;
mod traits;
pub mod ttl;

pub use codec::{Codec, Format};
pub use config::{ConfigError, ConfigStore, ExplorerConfig, ServerConfig};
pub use error::{DecodeError, MutationError, StoreError, TtlParseError};
pub use key_value::{
    Expiry, KeyDescriptor, KeyExpireRequest, KeyRecord, KeyRef, KeyReplaceRequest,
    KeyScanRequest, KeyType, KeyWriteRequest, RawReply, ScoredMember, StoreValue,
};
pub use listing::{KeyListing, KeySnapshot, filter_keys};
pub use mutation::{
    ContentView, CreateRequest, DeleteRequest, MutationService, ReadRequest, UpdateRequest,
};
pub use session::{Explorer, ExplorerSession, KeyViewState, Ticket};
pub use traits::{KeyValueStore, StoreRegistry};
pub use ttl::{NegativeTtlPolicy, TtlDirective, format_remaining, parse_ttl};
