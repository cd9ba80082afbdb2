pub mod driver;
pub mod order;
pub mod prescription;
pub mod tracking;
