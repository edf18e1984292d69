pub mod classify;
pub mod db;
pub mod engine;
pub mod error;
pub mod load;
pub mod models;
pub mod schedule;
pub mod store;

pub use engine::SrsEngine;
pub use error::{Result, SrsError};
