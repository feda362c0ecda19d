pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod render;
pub mod runner;
pub mod session;
pub mod spec;

pub use error::LocustgenError;
