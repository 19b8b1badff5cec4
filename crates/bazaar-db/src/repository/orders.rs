//! # Order Repository
//!
//! Orders are written only through [`OrderRepository::upsert`], keyed on the
//! canonical key. The remote platform is authoritative: whatever status it
//! reports last is what the row holds.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use bazaar_core::{timestamp, CanonicalKey, Money, Order, OrderMetadata, Platform};

use super::{datetime, integer, json_column, parsed, text};
use crate::error::DbResult;
use crate::store::{Filter, Record, RecordStore, SortOrder, Table};

const TABLE: Table = Table::Orders;

/// Repository for canonical orders.
#[derive(Clone)]
pub struct OrderRepository {
    store: Arc<dyn RecordStore>,
}

impl OrderRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        OrderRepository { store }
    }

    /// Inserts or overwrites the order under its canonical key.
    pub async fn upsert(&self, order: &Order) -> DbResult<()> {
        debug!(
            order_id = %order.external_id,
            key = %order.key,
            status = %order.status,
            "Upserting order"
        );
        self.store
            .upsert(TABLE, to_record(order), TABLE.conflict_key())
            .await
    }

    pub async fn get(&self, key: &CanonicalKey) -> DbResult<Option<Order>> {
        let rows = self
            .store
            .select(TABLE, &Filter::new().eq("id", key.as_str()).limit(1))
            .await?;
        rows.first().map(from_record).transpose()
    }

    /// Most recently created orders of one platform.
    pub async fn recent(&self, platform: Platform, limit: usize) -> DbResult<Vec<Order>> {
        let filter = Filter::new()
            .eq("platform", platform.as_str())
            .order_by("created_at", SortOrder::Desc)
            .limit(limit);
        self.store
            .select(TABLE, &filter)
            .await?
            .iter()
            .map(from_record)
            .collect()
    }
}

fn to_record(order: &Order) -> Record {
    let value = json!({
        "id": order.key.as_str(),
        "external_id": order.external_id,
        "platform": order.platform.as_str(),
        "status": order.status.as_str(),
        "amount_cents": order.amount.minor_units(),
        "product_name": order.product_name,
        "created_at": timestamp::to_store(order.created_at),
        "synced_at": timestamp::to_store(order.synced_at),
        "metadata": order.metadata,
    });
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn from_record(record: &Record) -> DbResult<Order> {
    Ok(Order {
        key: CanonicalKey::from_stored(text(TABLE, record, "id")?),
        external_id: text(TABLE, record, "external_id")?,
        platform: parsed(TABLE, record, "platform")?,
        status: parsed(TABLE, record, "status")?,
        amount: Money::from_minor_units(integer(TABLE, record, "amount_cents")?),
        product_name: text(TABLE, record, "product_name")?,
        created_at: datetime(TABLE, record, "created_at")?,
        synced_at: datetime(TABLE, record, "synced_at")?,
        metadata: json_column::<OrderMetadata>(TABLE, record, "metadata")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::pool::SqliteStore;
    use bazaar_core::{OrderStatus, RemoteOrder};
    use chrono::{TimeZone, Utc};

    fn order(status: &str) -> Order {
        let remote = RemoteOrder {
            external_id: "53939895937".to_string(),
            status_code: status.to_string(),
            amount: Money::from_major(500),
            product_name: "Thermos 1L".to_string(),
            customer_name: Some("Ivan P.".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap()),
        };
        Order::from_remote(
            Platform::Yandex,
            &remote,
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
        )
    }

    async fn repos() -> Vec<OrderRepository> {
        let sqlite: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let memory: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        vec![OrderRepository::new(sqlite), OrderRepository::new(memory)]
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        for repo in repos().await {
            let order = order("DELIVERED");
            repo.upsert(&order).await.unwrap();

            let stored = repo.get(&order.key).await.unwrap().unwrap();
            assert_eq!(stored, order);
            assert_eq!(stored.amount.minor_units(), 50000);
        }
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        for repo in repos().await {
            repo.upsert(&order("PROCESSING")).await.unwrap();
            repo.upsert(&order("CANCELLED")).await.unwrap();
            repo.upsert(&order("CANCELLED")).await.unwrap();

            let all = repo.recent(Platform::Yandex, 10).await.unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].status, OrderStatus::Cancelled);
            assert_eq!(all[0].metadata.platform_status, "CANCELLED");
        }
    }

    #[tokio::test]
    async fn test_get_missing_then_present() {
        for repo in repos().await {
            let order = order("DELIVERED");
            assert!(repo.get(&order.key).await.unwrap().is_none());
            repo.upsert(&order).await.unwrap();
            assert!(repo.get(&order.key).await.unwrap().is_some());
        }
    }
}
