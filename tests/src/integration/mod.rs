//! # Integration Flows

pub mod consensus_flows;
pub mod contract_flows;
pub mod crypto_flows;
pub mod ledger_flows;
pub mod node_flows;
