//! # Gift catalog and exchange
//!
//! Gifts are catalog entries shared by a pair. Purchasing one turns points
//! into an owned [`Item`]; redeeming the item asks the partner to honour
//! it. Catalog edits never touch items already bought.

use chrono::Utc;
use domains::{
    new_id, Conflict, DomainError, Filter, Gift, Item, ItemStatus, NoticeType, Query, RecordType, Result, Store,
    Transaction, User,
};
use tracing::{debug, info, instrument};

use crate::ledger::{self, Links};
use crate::notify::{NoticeDraft, Notifier};
use crate::tasks::MAX_POINTS;

/// Reason prefix of purchase records. History parses the item name back
/// out of it for items bought before items were linked by id.
pub const EXCHANGE_REASON_PREFIX: &str = "exchange: ";
pub const REDEEM_REASON_PREFIX: &str = "[redeem] ";
/// Message prefix of `GIFT_USED` notices, stripped again by usage history.
pub const GIFT_USE_MESSAGE_PREFIX: &str = "wants to use: ";
pub const MAX_NAME_CHARS: usize = 50;

/// Editable catalog fields. `None` leaves a field unchanged on update.
#[derive(Debug, Clone, Default)]
pub struct GiftDraft {
    pub name: Option<String>,
    pub points: Option<i64>,
    pub cover_img: Option<String>,
    pub desc: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GiftCommand {
    Add(GiftDraft),
    Update { gift_id: String, draft: GiftDraft },
    Delete { gift_id: String },
}

#[derive(Debug, Clone)]
pub enum PurchaseRequest {
    /// Price, name and image come from the catalog entry.
    Catalog { gift_id: String },
    /// Client-described item, kept for older clients.
    Inline { name: String, points: i64, image: Option<String>, kind: Option<String> },
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("gift name is required"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(DomainError::validation(format!("gift name is limited to {MAX_NAME_CHARS} characters")));
    }
    Ok(name.to_string())
}

fn validate_points(points: i64) -> Result<i64> {
    if points <= 0 || points > MAX_POINTS {
        return Err(DomainError::validation(format!("points must be between 1 and {MAX_POINTS}")));
    }
    Ok(points)
}

/// Whether `viewer` may see (and buy) `gift`.
fn visible_to(gift: &Gift, viewer: &User) -> bool {
    gift.creator_id == viewer.id
        || viewer.partner_id.as_deref() == Some(gift.creator_id.as_str())
        || gift.partner_id.as_deref() == Some(viewer.id.as_str())
}

async fn load_managed_gift(tx: &mut Transaction, owner: &str, gift_id: &str) -> Result<Gift> {
    let gift: Gift = tx.get(gift_id).await?.ok_or(DomainError::NotFound("gift"))?;
    if !gift.is_managed_by(owner) {
        return Err(DomainError::forbidden("only the gift's creator or their partner can change it"));
    }
    Ok(gift)
}

#[derive(Clone)]
pub struct GiftService {
    store: Store,
    notifier: Notifier,
}

impl GiftService {
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Add, update or delete a catalog entry. Returns the new id on add.
    #[instrument(skip(self, command), fields(caller = %owner))]
    pub async fn upsert(&self, owner: &str, command: GiftCommand) -> Result<Option<String>> {
        let mut tx = self.store.begin().await?;
        let created = match command {
            GiftCommand::Add(draft) => {
                let me: User = tx.get(owner).await?.ok_or(DomainError::NotFound("user"))?;
                let now = Utc::now();
                let gift = Gift {
                    id: new_id(),
                    name: validate_name(draft.name.as_deref().unwrap_or_default())?,
                    points: validate_points(draft.points.unwrap_or_default())?,
                    cover_img: draft.cover_img,
                    desc: draft.desc,
                    creator_id: me.id,
                    partner_id: me.partner_id,
                    create_time: now,
                    update_time: now,
                };
                tx.insert(&gift).await?;
                info!(gift_id = %gift.id, "gift added");
                Some(gift.id)
            }
            GiftCommand::Update { gift_id, draft } => {
                let mut gift = load_managed_gift(&mut tx, owner, &gift_id).await?;
                if let Some(name) = draft.name {
                    gift.name = validate_name(&name)?;
                }
                if let Some(points) = draft.points {
                    gift.points = validate_points(points)?;
                }
                if draft.cover_img.is_some() {
                    gift.cover_img = draft.cover_img;
                }
                if draft.desc.is_some() {
                    gift.desc = draft.desc;
                }
                gift.update_time = Utc::now();
                tx.replace(&gift).await?;
                info!(gift_id, "gift updated");
                None
            }
            GiftCommand::Delete { gift_id } => {
                load_managed_gift(&mut tx, owner, &gift_id).await?;
                tx.delete::<Gift>(&gift_id).await?;
                info!(gift_id, "gift deleted");
                None
            }
        };
        tx.commit().await?;
        Ok(created)
    }

    /// Gifts created by the caller or their current partner, or scoped to
    /// the caller by their partner snapshot.
    pub async fn list(&self, caller: &str) -> Result<Vec<Gift>> {
        let me: Option<User> = self.store.get(caller).await?;
        let mut scopes = vec![Filter::eq("creatorId", caller), Filter::eq("partnerId", caller)];
        if let Some(partner) = me.and_then(|u| u.partner_id) {
            scopes.push(Filter::eq("creatorId", partner));
        }
        Ok(self.store.find(&Query::newest_first(Filter::Or(scopes))).await?)
    }

    /// Spends points on one item. Affordability is checked against the
    /// balance read inside the purchase transaction.
    #[instrument(skip(self, request), fields(caller = %buyer))]
    pub async fn purchase(&self, buyer: &str, request: PurchaseRequest) -> Result<Item> {
        if let PurchaseRequest::Inline { name, points, .. } = &request {
            validate_name(name)?;
            validate_points(*points)?;
        }

        let mut tx = self.store.begin().await?;
        let me: User = tx.get(buyer).await?.ok_or(DomainError::NotFound("user"))?;

        let (gift_id, name, price, image, kind) = match request {
            PurchaseRequest::Catalog { gift_id } => {
                let gift: Gift = tx
                    .get(&gift_id)
                    .await?
                    .filter(|g| visible_to(g, &me))
                    .ok_or(DomainError::NotFound("gift"))?;
                (Some(gift.id), gift.name, gift.points, gift.cover_img.unwrap_or_default(), None)
            }
            PurchaseRequest::Inline { name, points, image, kind } => {
                (None, validate_name(&name)?, points, image.unwrap_or_default(), kind)
            }
        };

        if me.total_points < price {
            debug!(balance = me.total_points, price, "purchase rejected");
            return Err(Conflict::InsufficientPoints.into());
        }

        let item_id = new_id();
        let links = Links { gift_id: gift_id.clone(), item_id: Some(item_id.clone()), ..Links::default() };
        let reason = format!("{EXCHANGE_REASON_PREFIX}{name}");
        let record = ledger::apply_delta(&mut tx, &me.id, -price, reason, RecordType::Outcome, links).await?;

        let item = Item {
            id: item_id,
            user_id: me.id.clone(),
            name,
            image,
            kind: kind.unwrap_or_else(|| "unknown".to_string()),
            status: ItemStatus::Unused,
            points: price,
            gift_id,
            purchase_record_id: Some(record.id),
            create_time: Utc::now(),
            use_time: None,
        };
        tx.insert(&item).await?;

        let mut notices = Vec::new();
        if let Some(partner) = me.partner_id.clone() {
            let draft = NoticeDraft {
                kind: NoticeType::NewGift,
                title: "Gift exchanged".into(),
                message: format!("spent {price} points on: {}", item.name),
                points: -price,
                sender_id: me.id.clone(),
                receiver_id: partner,
            };
            notices.extend(self.notifier.emit(&mut tx, draft).await);
        }
        tx.commit().await?;
        self.notifier.dispatch(notices);

        info!(item_id = %item.id, price, "gift purchased");
        Ok(item)
    }

    /// `unused → used`, exactly once, with a zero-amount `gift_use` record
    /// and a request notice to the partner.
    #[instrument(skip(self), fields(caller = %owner))]
    pub async fn redeem(&self, owner: &str, item_id: &str) -> Result<Item> {
        let mut tx = self.store.begin().await?;
        let mut item: Item = tx
            .get(item_id)
            .await?
            .filter(|i: &Item| i.user_id == owner)
            .ok_or(DomainError::NotFound("item"))?;
        if item.status == ItemStatus::Used {
            return Err(Conflict::ItemAlreadyUsed.into());
        }

        item.status = ItemStatus::Used;
        item.use_time = Some(Utc::now());
        tx.replace(&item).await?;

        let links = Links { gift_id: item.gift_id.clone(), item_id: Some(item.id.clone()), ..Links::default() };
        let reason = format!("{REDEEM_REASON_PREFIX}{}", item.name);
        ledger::apply_delta(&mut tx, owner, 0, reason, RecordType::GiftUse, links).await?;

        let partner = tx.get::<User>(owner).await?.and_then(|u| u.partner_id);
        let mut notices = Vec::new();
        if let Some(partner) = partner {
            let draft = NoticeDraft {
                kind: NoticeType::GiftUsed,
                title: "Gift redemption request".into(),
                message: format!("{GIFT_USE_MESSAGE_PREFIX}{}", item.name),
                points: 0,
                sender_id: owner.to_string(),
                receiver_id: partner,
            };
            notices.extend(self.notifier.emit(&mut tx, draft).await);
        }
        tx.commit().await?;
        self.notifier.dispatch(notices);

        info!(item_id, "item redeemed");
        Ok(item)
    }

    pub async fn list_items(&self, owner: &str) -> Result<Vec<Item>> {
        Ok(self.store.find(&Query::newest_first(Filter::eq("userId", owner))).await?)
    }
}
