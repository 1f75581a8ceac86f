mod inspect;
mod order_chain;
mod provision;

pub use inspect::{InspectParams, inspect};
pub use order_chain::{OrderChainParams, order_chain};
pub use provision::{ProvisionParams, provision};
