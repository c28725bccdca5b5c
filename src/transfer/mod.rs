//! Per-connection transfer of the served resource.
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingRequest  │ ← writable reports are parked
//!        └────────┬─────────┘
//!                 │ any bytes read
//!                 ▼
//!        ┌──────────────────┐
//!        │    Streaming     │ ← one chunk per writable report
//!        └────────┬─────────┘
//!                 ├─ offset == size      → Complete
//!                 ├─ zero-length read    → Closed
//!                 └─ I/O or resource err → Failed
//! ```

pub mod connection;
pub mod resource;

pub use connection::{Phase, Step, Transfer};
pub use resource::{FileResource, MemoryResource, Resource};
