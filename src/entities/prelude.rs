pub use super::session_tokens::Entity as SessionTokens;
pub use super::transactions::Entity as Transactions;
pub use super::users::Entity as Users;
