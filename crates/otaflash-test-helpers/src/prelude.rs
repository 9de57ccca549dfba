//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use otaflash_test_helpers::prelude::*;
//! ```

pub use crate::fixtures::{
    SLOT_SIZE, data_image, firmware_image, sign_for_partition, signing_config, small_device,
    test_config, test_keypair,
};
pub use crate::mock::{PinEvent, RecordingPin, ScriptedSource, StalledSource, Step};
pub use crate::must::{must, must_some, must_with};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
