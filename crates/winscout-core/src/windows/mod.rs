//! Window records and the value types providers report.

pub mod types;

pub use types::{
    ImageHandle, RecordId, WindowHandle, WindowInfo, WindowRecord, WindowSnapshot,
};
