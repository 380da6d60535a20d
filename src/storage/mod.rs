pub mod db;
mod images;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use tables::*;
