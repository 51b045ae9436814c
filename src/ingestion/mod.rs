pub mod coordinator;
pub mod sample;
pub mod scheduler;
