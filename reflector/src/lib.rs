//! Per-endpoint dispatcher: resource-name → active publisher map, the
//! publish/play access lists, and the (cached) external authorizer.

pub mod access;
pub mod authorizer;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;

pub use access::AccessEntry;
pub use config::{EndpointConfig, HookConfig};
pub use dispatcher::{Accepted, ArchiveSource, Reflector};
pub use error::ReflectorError;
