//! Core protocol types shared by the codec, the write buffer and the body stream.
//!
//! - **Message Handling** ([`message`]): payload items and body framing descriptions
//!   - [`PayloadItem`]: a decoded chunk of body data or EOF
//!   - [`BodyLength`]: how a response body is delimited
//!   - [`WriteMode`]: how a request body is put on the wire
//!   - [`Direction`]: whether a stream reads or writes
//!
//! - **Error Handling** ([`error`]):
//!   - [`ParseError`]: chunked framing errors
//!   - [`BodyError`]: the error taxonomy surfaced by body streams

mod message;
pub use message::BodyLength;
pub use message::Direction;
pub use message::PayloadItem;
pub use message::WriteMode;

mod error;
pub use error::BodyError;
pub use error::ParseError;
