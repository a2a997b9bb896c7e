pub mod id;

pub use id::{EventId, SessionId};
