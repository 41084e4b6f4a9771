//! Test doubles shared by unit and integration tests.

pub mod mock_transport;

pub use mock_transport::{MockReply, MockTransport, RecordedCall};
