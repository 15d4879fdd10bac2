//! # Exchange history
//!
//! Read-only projection joining purchase records, items, redeem records and
//! `GIFT_USED` notices into one entry per purchase.
//!
//! Items and redeem records carry explicit ids (`purchaseRecordId`,
//! `itemId`); those are joined first. Documents written before the ids
//! existed fall back to name matching, and an entry whose name matched more
//! than one legacy item is flagged `ambiguous`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use domains::{Filter, Item, ItemStatus, Notice, Query, Record, Result, Store, User};
use serde::Serialize;

use crate::gifts::{EXCHANGE_REASON_PREFIX, GIFT_USE_MESSAGE_PREFIX, REDEEM_REASON_PREFIX};
use crate::page::{Page, PageRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    Unused,
    /// Used items, plus purchases whose item no longer exists.
    Used,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Unused,
    Used,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEntry {
    pub id: String,
    pub amount: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseEntry {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub use_time: DateTime<Utc>,
    pub operator: String,
    pub receiver: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// The item id, or `virtual_{record id}` when the item is gone.
    pub id: String,
    pub name: String,
    pub image: String,
    pub points: i64,
    pub status: HistoryStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    pub is_deleted: bool,
    pub ambiguous: bool,
    pub purchase_record: PurchaseEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_record: Option<UseEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageDirection {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub id: String,
    pub gift_name: String,
    pub direction: UsageDirection,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    pub read: bool,
    pub title: String,
}

/// Display label for a participant, relative to the viewer.
fn display_name(users: &HashMap<String, User>, id: Option<&str>, viewer: &str) -> String {
    match id {
        None => "unknown".to_string(),
        Some(id) if id == viewer => "me".to_string(),
        Some(id) => users
            .get(id)
            .map(|u| u.nick_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "partner".to_string()),
    }
}

#[derive(Clone)]
pub struct HistoryService {
    store: Store,
}

impl HistoryService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn use_notices_filter(user: &str) -> Filter {
        Filter::eq("type", "GIFT_USED")
            .and(Filter::Or(vec![Filter::eq("senderId", user), Filter::eq("receiverId", user)]))
    }

    pub async fn exchange_history(
        &self,
        user: &str,
        filter: HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let purchases: Vec<Record> = self
            .store
            .find(&Query::newest_first(
                Filter::eq("userId", user)
                    .and(Filter::eq("type", "outcome"))
                    .and(Filter::prefix("reason", EXCHANGE_REASON_PREFIX)),
            ))
            .await?;
        let items: Vec<Item> = self.store.find(&Query::newest_first(Filter::eq("userId", user))).await?;
        let uses: Vec<Record> = self
            .store
            .find(&Query::newest_first(Filter::eq("userId", user).and(Filter::eq("type", "gift_use"))))
            .await?;
        let notices: Vec<Notice> = self.store.find(&Query::newest_first(Self::use_notices_filter(user))).await?;

        let mut ids: HashSet<String> = HashSet::from([user.to_string()]);
        ids.extend(notices.iter().flat_map(|n| [n.sender_id.clone(), n.receiver_id.clone()]));
        let users: HashMap<String, User> = self
            .store
            .find::<User>(&Query::new(Filter::any_of("id", ids)))
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let entries = join(user, &purchases, &items, &uses, &notices, &users);
        let filtered = entries
            .into_iter()
            .filter(|e| match filter {
                HistoryFilter::All => true,
                HistoryFilter::Unused => e.status == HistoryStatus::Unused,
                HistoryFilter::Used => e.status != HistoryStatus::Unused,
            })
            .collect();
        Ok(page.slice(filtered))
    }

    /// Redemption requests sent or received by `user`, newest first.
    pub async fn gift_usage(&self, user: &str, page: PageRequest) -> Result<Vec<UsageEntry>> {
        let query = Query::newest_first(Self::use_notices_filter(user)).page(page.page, page.page_size);
        let notices: Vec<Notice> = self.store.find(&query).await?;
        Ok(notices
            .into_iter()
            .map(|n| UsageEntry {
                gift_name: n.message.strip_prefix(GIFT_USE_MESSAGE_PREFIX).unwrap_or(&n.message).to_string(),
                direction: if n.sender_id == user { UsageDirection::Sent } else { UsageDirection::Received },
                id: n.id,
                create_time: n.create_time,
                read: n.read,
                title: n.title,
            })
            .collect())
    }
}

fn join(
    viewer: &str,
    purchases: &[Record],
    items: &[Item],
    uses: &[Record],
    notices: &[Notice],
    users: &HashMap<String, User>,
) -> Vec<HistoryEntry> {
    let mut claimed_items: HashSet<&str> = HashSet::new();
    let mut claimed_uses: HashSet<&str> = HashSet::new();

    purchases
        .iter()
        .map(|record| {
            let name = record.reason.strip_prefix(EXCHANGE_REASON_PREFIX).unwrap_or(&record.reason).trim();

            // Linked item first, then the closest-in-time unclaimed legacy
            // item of the same name.
            let mut ambiguous = false;
            let linked = items.iter().find(|i| {
                i.purchase_record_id.as_deref() == Some(record.id.as_str())
                    || record.item_id.as_deref() == Some(i.id.as_str())
            });
            let item = linked.or_else(|| {
                let candidates: Vec<&Item> = items
                    .iter()
                    .filter(|i| i.purchase_record_id.is_none() && i.name == name)
                    .filter(|i| !claimed_items.contains(i.id.as_str()))
                    .collect();
                ambiguous = candidates.len() > 1;
                candidates
                    .into_iter()
                    .min_by_key(|i| (i.create_time - record.create_time).num_milliseconds().abs())
            });
            if let Some(item) = item {
                claimed_items.insert(item.id.as_str());
            }

            let use_record = item
                .and_then(|item| uses.iter().find(|u| u.item_id.as_deref() == Some(item.id.as_str())))
                .or_else(|| {
                    let legacy_reason = format!("{REDEEM_REASON_PREFIX}{name}");
                    uses.iter().find(|u| {
                        u.item_id.is_none() && u.reason == legacy_reason && !claimed_uses.contains(u.id.as_str())
                    })
                });
            let use_entry = use_record.map(|u| {
                claimed_uses.insert(u.id.as_str());
                let message = format!("{GIFT_USE_MESSAGE_PREFIX}{name}");
                let notice = notices
                    .iter()
                    .filter(|n| n.message == message && n.create_time >= record.create_time)
                    .min_by_key(|n| (n.create_time - u.create_time).num_milliseconds().abs());
                UseEntry {
                    id: u.id.clone(),
                    use_time: item.and_then(|i| i.use_time).unwrap_or(u.create_time),
                    operator: display_name(users, notice.map(|n| n.sender_id.as_str()).or(Some(viewer)), viewer),
                    receiver: display_name(users, notice.map(|n| n.receiver_id.as_str()), viewer),
                    message: notice.map(|n| n.message.clone()).unwrap_or_default(),
                }
            });

            HistoryEntry {
                id: item.map(|i| i.id.clone()).unwrap_or_else(|| format!("virtual_{}", record.id)),
                name: name.to_string(),
                image: item.map(|i| i.image.clone()).unwrap_or_default(),
                points: record.amount.abs(),
                status: match item.map(|i| i.status) {
                    Some(ItemStatus::Unused) => HistoryStatus::Unused,
                    Some(ItemStatus::Used) => HistoryStatus::Used,
                    None => HistoryStatus::Deleted,
                },
                create_time: record.create_time,
                is_deleted: item.is_none(),
                ambiguous,
                purchase_record: PurchaseEntry {
                    id: record.id.clone(),
                    amount: record.amount,
                    create_time: record.create_time,
                    operator: display_name(users, Some(record.user_id.as_str()), viewer),
                },
                use_record: use_entry,
            }
        })
        .collect()
}
