pub mod admin;
pub mod initial_deposit;
pub mod stream;
pub mod transactions;

pub use admin::*;
pub use initial_deposit::*;
pub use stream::*;
pub use transactions::*;
