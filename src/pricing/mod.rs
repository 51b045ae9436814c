pub mod aggregator;
pub mod view;
