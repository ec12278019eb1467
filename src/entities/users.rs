use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Compared exactly as stored (case-sensitive).
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub is_verified: bool,

    pub is_admin: bool,

    /// 6-digit email verification code; NULL once verified.
    #[sea_orm(nullable)]
    pub verification_code: Option<String>,

    /// RFC3339 expiry for the code; NULL once verified.
    #[sea_orm(nullable)]
    pub verification_code_expires: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::session_tokens::Entity")]
    SessionTokens,

    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::session_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SessionTokens.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
