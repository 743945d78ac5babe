pub mod point;
pub mod record;

pub use point::{StoragePoint, DEVICE_TAG, MEASUREMENT};
pub use record::{decode_payload, DecodeError, TelemetryRecord, UNKNOWN_DEVICE};
