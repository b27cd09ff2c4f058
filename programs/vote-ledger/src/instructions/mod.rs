pub mod store_merkle_root;
pub mod submit_votes;

pub use store_merkle_root::*;
pub use submit_votes::*;
