pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod transport;

pub use crate::agent::{ClientEnvironment, FlushReport, TrackHandle, TrackOutcome, TrackingAgent};
pub use crate::config::AgentConfig;
pub use crate::error::{DeliveryError, StorageError};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
pub use crate::transport::{HttpTransport, Transport};
