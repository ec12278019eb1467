//! Per-user transaction rows. Every query carries the owner's id in the
//! WHERE clause; there is no path that touches another user's rows.

use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::transactions;

pub use crate::entities::transactions::Model as Transaction;

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub amount: f64,
    pub description: Option<String>,
    pub date: String,
    pub kind: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<String>,
    pub category: Option<String>,
}

/// Income and expense totals for one user.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSummary {
    pub income: f64,
    pub expense: f64,
}

pub struct TransactionRepository {
    conn: DatabaseConnection,
}

impl TransactionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(&self, user_id: i32, new: NewTransaction) -> Result<Transaction> {
        let now = chrono::Utc::now().to_rfc3339();

        let model = transactions::ActiveModel {
            user_id: Set(user_id),
            amount: Set(new.amount),
            description: Set(new.description),
            date: Set(new.date),
            kind: Set(new.kind),
            category: Set(new.category),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert transaction")?;

        Ok(model)
    }

    pub async fn list(&self, user_id: i32, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id));

        if let Some(kind) = &filter.kind {
            query = query.filter(transactions::Column::Kind.eq(kind));
        }
        if let Some(category) = &filter.category {
            query = query.filter(transactions::Column::Category.eq(category));
        }

        query
            .order_by_desc(transactions::Column::Date)
            .all(&self.conn)
            .await
            .context("Failed to list transactions")
    }

    /// Update a transaction owned by the user. Returns None when no row
    /// matches both id and owner.
    pub async fn update(
        &self,
        id: i32,
        user_id: i32,
        new: NewTransaction,
    ) -> Result<Option<Transaction>> {
        let existing = transactions::Entity::find_by_id(id)
            .filter(transactions::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query transaction for update")?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let mut active: transactions::ActiveModel = existing.into();
        active.amount = Set(new.amount);
        active.description = Set(new.description);
        active.date = Set(new.date);
        active.kind = Set(new.kind);
        active.category = Set(new.category);

        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update transaction")?;

        Ok(Some(updated))
    }

    /// Delete a transaction owned by the user. Returns false when no row
    /// matches.
    pub async fn delete(&self, id: i32, user_id: i32) -> Result<bool> {
        let result = transactions::Entity::delete_many()
            .filter(transactions::Column::Id.eq(id))
            .filter(transactions::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete transaction")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn summary(&self, user_id: i32) -> Result<TransactionSummary> {
        let rows = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await
            .context("Failed to load transactions for summary")?;

        let mut summary = TransactionSummary::default();
        for row in rows {
            match row.kind.as_str() {
                "income" => summary.income += row.amount,
                "expense" => summary.expense += row.amount,
                _ => {}
            }
        }

        Ok(summary)
    }

    pub async fn count_for_user(&self, user_id: i32) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count transactions")
    }
}
