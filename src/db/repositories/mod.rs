pub mod session;
pub mod transaction;
pub mod user;
pub mod verification;
