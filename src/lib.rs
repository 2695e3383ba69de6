mod exports;
pub use exports::*;

pub mod geometry;
pub mod polar;
pub mod projection;
pub mod basis;
pub mod inverter;
pub mod progress;
pub mod special;
pub mod config;
pub mod io;
pub mod error;
