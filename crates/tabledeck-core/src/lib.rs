pub mod actions;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod table;
pub mod tracker;

pub use error::{DeckError, Result};
