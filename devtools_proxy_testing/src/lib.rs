//! Utilities for exercising `devtools_proxy` sessions in tests.
//!
//! The helpers cover both ends of a proxied session: in-memory WebSocket
//! pairs and a scripted upstream browser, plus builders for protocol frames
//! and sinks that record what the correlation engine emitted.
//!
//! ```rust
//! use devtools_proxy_testing::frames;
//!
//! let raw = frames::request(1, "Page.enable", serde_json::json!({}));
//! assert_eq!(raw, r#"{"id":1,"method":"Page.enable","params":{}}"#);
//! ```

pub mod buffer;
pub mod frames;
pub mod logging;
pub mod macros;
pub mod upstream;
pub mod websocket;

pub use buffer::SharedBuffer;
pub use devtools_proxy::test_helpers::{
    OpenedSinks,
    RecordingSink,
    opened_sink,
    recording_registry,
};
pub use logging::{LoggerHandle, logger};
pub use upstream::{FakeUpstream, VersionReply};
pub use websocket::{connect_client, ws_pair};

/// Result type used by async tests that propagate setup failures.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
