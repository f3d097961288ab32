//! Contract domain: configuration, errors and the content port.

mod config;
mod content;
mod error;

pub use config::ContractConfig;
pub use content::{ContentSource, InMemoryContentSource};
pub use error::{ContractError, ContractResult};
