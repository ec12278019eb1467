use serde::Serialize;

use crate::db::Transaction;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionDto {
    pub id: i32,
    pub amount: f64,
    pub description: Option<String>,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    pub created_at: String,
}

impl From<Transaction> for TransactionDto {
    fn from(model: Transaction) -> Self {
        Self {
            id: model.id,
            amount: model.amount,
            description: model.description,
            date: model.date,
            kind: model.kind,
            category: model.category,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminUserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<crate::db::User> for AdminUserDto {
    fn from(user: crate::db::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_verified: user.is_verified,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}
