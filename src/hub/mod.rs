pub mod fanout;

pub use fanout::{DropReason, Hub, HubHandle, channel};
