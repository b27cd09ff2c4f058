pub mod receipt;
pub mod vote;
pub mod voting_contract;

pub use receipt::*;
pub use vote::*;
pub use voting_contract::*;
