pub mod query;
pub mod response;
pub mod transaction;

pub use query::*;
pub use response::*;
pub use transaction::*;
