//! # Ledger
//!
//! `User.totalPoints` is only ever written here, and only through the
//! store's atomic increment. Each call appends exactly one `Record`.

use chrono::Utc;
use domains::{new_id, DomainError, Filter, Query, Record, RecordType, Result, Store, StoreError, Transaction, User};
use tracing::{debug, instrument};

/// Optional foreign keys carried by a ledger entry.
#[derive(Debug, Clone, Default)]
pub struct Links {
    pub task_id: Option<String>,
    pub gift_id: Option<String>,
    pub item_id: Option<String>,
}

/// Adds `amount` to the user's balance and appends the matching record,
/// both inside `tx`. The resulting balance may be negative.
#[instrument(skip(tx, reason, links), fields(reason = %reason))]
pub async fn apply_delta(
    tx: &mut Transaction,
    user_id: &str,
    amount: i64,
    reason: String,
    kind: RecordType,
    links: Links,
) -> Result<Record> {
    tx.increment::<User>(user_id, "totalPoints", amount).await.map_err(|err| match err {
        StoreError::Missing { .. } => DomainError::NotFound("user"),
        other => other.into(),
    })?;

    let record = Record {
        id: new_id(),
        user_id: user_id.to_string(),
        amount,
        reason,
        kind,
        task_id: links.task_id,
        gift_id: links.gift_id,
        item_id: links.item_id,
        create_time: Utc::now(),
    };
    tx.insert(&record).await?;
    debug!(record_id = %record.id, "ledger entry appended");
    Ok(record)
}

/// Balance as last committed. Outside a transaction this is advisory only.
pub async fn balance(store: &Store, user_id: &str) -> Result<i64> {
    store
        .get::<User>(user_id)
        .await?
        .map(|u| u.total_points)
        .ok_or(DomainError::NotFound("user"))
}

/// Stored balance next to the sum of the user's records. They differ only
/// if a write bypassed [`apply_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub balance: i64,
    pub ledger_sum: i64,
}

impl Reconciliation {
    pub fn drift(&self) -> i64 {
        self.balance - self.ledger_sum
    }
}

pub async fn reconcile(store: &Store, user_id: &str) -> Result<Reconciliation> {
    let balance = balance(store, user_id).await?;
    let records: Vec<Record> = store.find(&Query::new(Filter::eq("userId", user_id))).await?;
    Ok(Reconciliation { balance, ledger_sum: records.iter().map(|r| r.amount).sum() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn delta_moves_balance_and_appends_record() {
        let store = testing::store();
        testing::seed(&store, &[("A", 30)], &[]).await;

        let mut tx = store.begin().await.unwrap();
        let record = apply_delta(&mut tx, "A", -50, "[penalty] late".into(), RecordType::Penalty, Links::default())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(record.amount, -50);
        assert_eq!(balance(&store, "A").await.unwrap(), -20);
        let rec = reconcile(&store, "A").await.unwrap();
        assert_eq!(rec.ledger_sum, -50);
        assert_eq!(rec.drift(), 30);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = testing::store();
        let mut tx = store.begin().await.unwrap();
        let err = apply_delta(&mut tx, "ghost", 5, "x".into(), RecordType::TaskDone, Links::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound("user")));
    }
}
