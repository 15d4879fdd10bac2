//! # Request bodies
//!
//! One struct per operation, deserialized from the camelCase JSON body and
//! converted into service input. Only shape is checked here; business rules
//! (lengths, point ranges, ownership) stay in the services.

use domains::{DomainError, Result, TaskType};
use serde::Deserialize;
use services::{GiftCommand, GiftDraft, HistoryFilter, NewTask, PageRequest, ProfileUpdate, PurchaseRequest, TaskAction};

pub const RECORDS_PAGE_SIZE: usize = 50;
pub const HISTORY_PAGE_SIZE: usize = 20;
pub const USAGE_PAGE_SIZE: usize = 20;
pub const NOTICES_PAGE_SIZE: usize = 20;

fn required(value: String, field: &str) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(value)
}

// ─── Tasks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTaskRequest {
    #[serde(default)]
    pub title: String,
    pub points: i64,
    #[serde(rename = "type")]
    pub kind: TaskType,
    #[serde(default)]
    pub target_id: Option<String>,
}

impl From<PublishTaskRequest> for NewTask {
    fn from(req: PublishTaskRequest) -> Self {
        NewTask { title: req.title, points: req.points, kind: req.kind, target_id: req.target_id }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionParam {
    Submit,
    Confirm,
}

impl From<ActionParam> for TaskAction {
    fn from(action: ActionParam) -> Self {
        match action {
            ActionParam::Submit => TaskAction::Submit,
            ActionParam::Confirm => TaskAction::Confirm,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceTaskRequest {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub action: Option<ActionParam>,
}

impl AdvanceTaskRequest {
    pub fn into_parts(self) -> Result<(String, Option<TaskAction>)> {
        Ok((required(self.task_id, "taskId")?, self.action.map(Into::into)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdRequest {
    #[serde(default)]
    pub task_id: String,
}

impl TaskIdRequest {
    pub fn task_id(self) -> Result<String> {
        required(self.task_id, "taskId")
    }
}

// ─── Gifts and items ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineItem {
    #[serde(default)]
    pub name: String,
    pub points: i64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// `giftId` wins over `item` when both are sent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseGiftRequest {
    #[serde(default)]
    pub gift_id: Option<String>,
    #[serde(default)]
    pub item: Option<InlineItem>,
}

impl TryFrom<PurchaseGiftRequest> for PurchaseRequest {
    type Error = DomainError;

    fn try_from(req: PurchaseGiftRequest) -> Result<Self> {
        match (req.gift_id.filter(|id| !id.trim().is_empty()), req.item) {
            (Some(gift_id), _) => Ok(PurchaseRequest::Catalog { gift_id: gift_id.trim().to_string() }),
            (None, Some(item)) => Ok(PurchaseRequest::Inline {
                name: item.name,
                points: item.points,
                image: item.image,
                kind: item.kind,
            }),
            (None, None) => Err(DomainError::validation("giftId or item is required")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIdRequest {
    #[serde(default)]
    pub item_id: String,
}

impl ItemIdRequest {
    pub fn item_id(self) -> Result<String> {
        required(self.item_id, "itemId")
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub cover_img: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

impl From<GiftData> for GiftDraft {
    fn from(data: GiftData) -> Self {
        GiftDraft { name: data.name, points: data.points, cover_img: data.cover_img, desc: data.desc }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertGiftRequest {
    pub action: UpsertAction,
    #[serde(default)]
    pub gift_id: Option<String>,
    #[serde(default)]
    pub gift_data: Option<GiftData>,
}

impl TryFrom<UpsertGiftRequest> for GiftCommand {
    type Error = DomainError;

    fn try_from(req: UpsertGiftRequest) -> Result<Self> {
        let gift_id = || required(req.gift_id.clone().unwrap_or_default(), "giftId");
        match req.action {
            UpsertAction::Add => {
                let data = req.gift_data.ok_or_else(|| DomainError::validation("giftData is required"))?;
                Ok(GiftCommand::Add(data.into()))
            }
            UpsertAction::Update => {
                let gift_id = gift_id()?;
                let data = req.gift_data.ok_or_else(|| DomainError::validation("giftData is required"))?;
                Ok(GiftCommand::Update { gift_id, draft: data.into() })
            }
            UpsertAction::Delete => Ok(GiftCommand::Delete { gift_id: gift_id()? }),
        }
    }
}

// ─── Pairing and profile ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindPartnerRequest {
    #[serde(default)]
    pub partner_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        ProfileUpdate { nick_name: req.nick_name, avatar_url: req.avatar_url }
    }
}

// ─── Listings ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl PageParams {
    pub fn request(&self, default_size: usize) -> PageRequest {
        PageRequest::new(self.page, self.page_size, default_size)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterParam {
    #[default]
    All,
    Unused,
    Used,
}

impl From<FilterParam> for HistoryFilter {
    fn from(filter: FilterParam) -> Self {
        match filter {
            FilterParam::All => HistoryFilter::All,
            FilterParam::Unused => HistoryFilter::Unused,
            FilterParam::Used => HistoryFilter::Used,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeHistoryRequest {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub filter: FilterParam,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNoticesRequest {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNoticesReadRequest {
    #[serde(default)]
    pub notice_ids: Option<Vec<String>>,
}
