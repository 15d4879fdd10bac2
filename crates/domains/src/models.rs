//! # Domain Models
//!
//! The six document kinds shared by both partners of a pair. Field names are
//! serialized in camelCase because the documents are read directly by the
//! mobile client's change feed.
//!
//! Timestamps are stored as epoch milliseconds so that range filters compare
//! numerically on every store backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Collection, Document};

/// Authenticated identity of a user. Also the primary key of their `User`.
pub type UserId = String;

/// Generates a fresh document id for everything except users.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ─── User ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// May go negative: penalties are not capped by the current balance.
    pub total_points: i64,
    /// Symmetric: `a.partner_id == Some(b.id)` iff `b.partner_id == Some(a.id)`.
    #[serde(default)]
    pub partner_id: Option<UserId>,
    /// Indexed lookup key for pairing. `None` only on users created before
    /// the field existed.
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
}

impl User {
    pub fn is_paired_with(&self, other: &str) -> bool {
        self.partner_id.as_deref() == Some(other)
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    fn id(&self) -> &str {
        &self.id
    }
}

// ─── Task ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Reward,
    Penalty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    WaitingConfirmation,
    Done,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Always positive. The direction of the ledger effect comes from `kind`.
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: TaskType,
    pub status: TaskStatus,
    pub creator_id: UserId,
    pub target_id: UserId,
    #[serde(default)]
    pub executor_id: Option<UserId>,
    /// True while the task's point effect is on the target's ledger.
    #[serde(default)]
    pub settled: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub submit_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub confirm_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub complete_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub revoke_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Signed ledger amount applied to the target when the task settles.
    pub fn settlement_amount(&self) -> i64 {
        match self.kind {
            TaskType::Reward => self.points,
            TaskType::Penalty => -self.points,
        }
    }

    /// Whoever the settlement is credited or charged to.
    pub fn beneficiary(&self) -> &str {
        if self.target_id.is_empty() {
            self.executor_id.as_deref().unwrap_or(&self.creator_id)
        } else {
            &self.target_id
        }
    }
}

impl Document for Task {
    const COLLECTION: Collection = Collection::Tasks;
    fn id(&self) -> &str {
        &self.id
    }
}

// ─── Record ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Penalty,
    TaskDone,
    Outcome,
    Revoke,
    GiftUse,
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub user_id: UserId,
    pub amount: i64,
    pub reason: String,
    #[serde(rename = "type")]
    pub kind: RecordType,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub gift_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
}

impl Document for Record {
    const COLLECTION: Collection = Collection::Records;
    fn id(&self) -> &str {
        &self.id
    }
}

// ─── Gift ───────────────────────────────────────────────────────────────────

/// Catalog entry. Owned inventory lives in [`Item`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: String,
    pub name: String,
    pub points: i64,
    #[serde(default)]
    pub cover_img: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    pub creator_id: UserId,
    /// Snapshot of the creator's partner when the gift was created. Always
    /// serialized (as `null` when unpaired) so a missing key marks a legacy
    /// document that still needs backfilling.
    #[serde(default)]
    pub partner_id: Option<UserId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub update_time: DateTime<Utc>,
}

impl Gift {
    /// Creator, or the partner recorded at creation time.
    pub fn is_managed_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.partner_id.as_deref() == Some(user_id)
    }
}

impl Document for Gift {
    const COLLECTION: Collection = Collection::Gifts;
    fn id(&self) -> &str {
        &self.id
    }
}

// ─── Item ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Unused,
    Used,
}

/// One purchased instance of a gift, decoupled from the catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(rename = "type", default = "Item::default_kind")]
    pub kind: String,
    pub status: ItemStatus,
    /// Price paid.
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub gift_id: Option<String>,
    /// `None` on items purchased before the link existed.
    #[serde(default)]
    pub purchase_record_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub use_time: Option<DateTime<Utc>>,
}

impl Item {
    fn default_kind() -> String {
        "unknown".to_string()
    }
}

impl Document for Item {
    const COLLECTION: Collection = Collection::Items;
    fn id(&self) -> &str {
        &self.id
    }
}

// ─── Notice ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeType {
    NewTask,
    TaskSubmitted,
    TaskDone,
    TaskRevoked,
    NewGift,
    GiftUsed,
    BindSuccess,
}

/// In-app notification. A projection only; nothing reads it back to make
/// decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NoticeType,
    pub title: String,
    pub message: String,
    /// Signed; zero when the event moved no points.
    pub points: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub read: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub create_time: DateTime<Utc>,
}

impl Document for Notice {
    const COLLECTION: Collection = Collection::Notices;
    fn id(&self) -> &str {
        &self.id
    }
}
