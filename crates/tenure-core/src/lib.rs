pub mod api;
pub mod batch;
pub mod config;
pub mod cycle;
pub mod drift;
pub mod error;
pub mod io;
pub mod member;
pub mod mutator;
pub mod reconciler;
pub mod shutdown;
pub mod tier;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{Result, TenureError};
