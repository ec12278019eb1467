pub mod prelude;

pub mod session_tokens;
pub mod transactions;
pub mod users;
