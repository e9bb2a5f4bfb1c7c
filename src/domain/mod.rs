mod account;
mod ledger;
mod money;
mod reservation;
mod revenue;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use reservation::*;
pub use revenue::*;
