//! Memoizer Core - Identity and Metadata Types
//!
//! Canonical call encoding, node identities, timestamps and the metadata
//! record attached to cached results. All other crates depend on this.
//! This crate does no caching and no evaluation.

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod registry;
pub mod timestamp;
pub mod value;

pub use codec::{encode_args, encode_call, encode_value, is_identifier, parse_call, parse_value};
pub use config::{CacheKind, MemoizerConfig};
pub use error::{
    CacheError, CodecError, ConfigError, ContextError, IdentityError, MemoError, MemoResult,
    RegistryError, TimestampError,
};
pub use identity::{
    CallId, FunctionRef, Identify, NodeId, FILENAME_MAX_LEN, QUERYSTRING_MAX_LEN,
};
pub use metadata::Metadata;
pub use registry::{Invoker, RegisteredFunction};
pub use timestamp::{asof_folder_name, format_asof, min_asof, parse_asof, truncate_asof, Asof};
pub use value::{ByteString, CallArgs, FromValue, ToValue, Value};
