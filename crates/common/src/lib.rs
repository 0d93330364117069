//! Transport-free types shared by the dispatcher: the normalized request
//! record, the handler result envelope, and the request-path error taxonomy.

pub mod error;
pub mod protocol;

pub use error::DispatchError;
pub use protocol::{HandlerResult, HeaderValue, NormalizedRequest};
