pub mod config;
pub mod db;
pub mod extract;
pub mod provider;
pub mod summarizer;
pub mod tracker;
pub mod types;

pub use types::*;
