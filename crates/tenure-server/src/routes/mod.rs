pub mod cycles;
pub mod health;
