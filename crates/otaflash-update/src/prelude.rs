//! Convenience re-exports for driving an update

pub use crate::config::{StatusLedConfig, StreamRetryPolicy, UpdateConfig};
pub use crate::error::{PlatformError, UpdateError};
pub use crate::partition::{Partition, PartitionSubtype, PartitionType, TargetKind, UpdateSize};
pub use crate::platform::{FlashPlatform, StatusPin};
pub use crate::session::UpdateSession;
pub use crate::stream::{ByteSource, ReaderSource};
