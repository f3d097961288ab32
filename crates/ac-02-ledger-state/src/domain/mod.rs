pub mod contracts;
pub mod entities;
pub mod error;
