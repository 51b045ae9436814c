pub mod ids;
pub mod price;
