//! Request and response handles exchanged with the transport layer.

mod request;
mod response;

pub use request::{BodyBuffer, BodySender, IncomingRequest};
pub use response::{ResponseError, ResponseEvent, ServerResponse};
