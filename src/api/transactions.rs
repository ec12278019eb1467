use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::{ApiError, AppState, MessageResponse, TransactionDto};
use crate::db::{NewTransaction, TransactionFilter};

const TRANSACTION_KINDS: [&str; 2] = ["income", "expense"];

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct TransactionRequest {
    pub amount: f64,
    pub description: Option<String>,
    /// YYYY-MM-DD; defaults to today
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub term: String,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub success: bool,
    pub transaction: TransactionDto,
}

#[derive(Serialize)]
pub struct TransactionListResponse {
    pub success: bool,
    pub transactions: Vec<TransactionDto>,
}

#[derive(Serialize)]
pub struct CategoriesResponse {
    pub success: bool,
    pub categories: serde_json::Value,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}

fn into_new_transaction(payload: TransactionRequest) -> Result<NewTransaction, ApiError> {
    if !TRANSACTION_KINDS.contains(&payload.kind.as_str()) {
        return Err(ApiError::validation("Invalid transaction type"));
    }

    let date = payload
        .date
        .unwrap_or_else(|| chrono::Utc::now().date_naive().to_string());

    Ok(NewTransaction {
        amount: payload.amount,
        description: payload.description,
        date,
        kind: payload.kind,
        category: payload.category,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /transactions
pub async fn add_transaction(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let new = into_new_transaction(payload)?;

    let transaction = state.store().add_transaction(auth_user.id, new).await?;

    Ok(Json(TransactionResponse {
        success: true,
        transaction: transaction.into(),
    }))
}

/// GET /transactions?type=&category=
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    // Unknown kind values are ignored rather than rejected, matching the
    // lenient filter behavior of the dashboard.
    let filter = TransactionFilter {
        kind: query
            .kind
            .filter(|k| TRANSACTION_KINDS.contains(&k.as_str())),
        category: query.category,
    };

    let transactions = state.store().list_transactions(auth_user.id, &filter).await?;

    Ok(Json(TransactionListResponse {
        success: true,
        transactions: transactions.into_iter().map(Into::into).collect(),
    }))
}

/// PUT /transactions/{id}
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let new = into_new_transaction(payload)?;

    let updated = state
        .store()
        .update_transaction(id, auth_user.id, new)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction not found".to_string()))?;

    Ok(Json(TransactionResponse {
        success: true,
        transaction: updated.into(),
    }))
}

/// DELETE /transactions/{id}
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state.store().delete_transaction(id, auth_user.id).await?;

    if !deleted {
        return Err(ApiError::NotFound("Transaction not found".to_string()));
    }

    Ok(Json(MessageResponse::new("Transaction deleted successfully")))
}

/// GET /transactions/categories
pub async fn categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        success: true,
        categories: serde_json::json!({
            "income": ["Salary", "Gift", "Fund"],
            "expense": ["Food", "Apartment", "Transportation"],
        }),
    })
}

/// GET /transactions/summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = state.store().transaction_summary(auth_user.id).await?;

    Ok(Json(SummaryResponse {
        success: true,
        income: summary.income,
        expense: summary.expense,
        balance: summary.income - summary.expense,
    }))
}
