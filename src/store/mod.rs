pub mod drivers;
pub mod orders;
pub mod prescriptions;
