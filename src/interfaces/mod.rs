pub mod collector;
pub mod publisher;
