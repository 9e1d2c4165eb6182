pub mod balance;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod store;
