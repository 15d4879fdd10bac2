//! # Users, records and notices
//!
//! Users are created lazily on first access; everything else here is a
//! read or a receiver-only flag flip.

use chrono::{DateTime, Utc};
use domains::{DomainError, Filter, Notice, Query, Record, Result, Store, User};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::page::PageRequest;
use crate::pairing::compute_invite_code;

pub const MAX_NICK_NAME_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: String,
    pub nick_name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: User,
    pub partner: Option<PartnerSummary>,
    pub invite_code: String,
    /// Sum of the user's record amounts since 00:00 UTC.
    pub today_change: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub nick_name: Option<String>,
    pub avatar_url: Option<String>,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).map_or(now, |midnight| midnight.and_utc())
}

#[derive(Clone)]
pub struct UserService {
    store: Store,
}

impl UserService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Loads the caller, creating them on first access and backfilling a
    /// missing invite code.
    async fn ensure_user(&self, caller: &str) -> Result<User> {
        if let Some(user) = self.store.get::<User>(caller).await? {
            if user.invite_code.is_some() {
                return Ok(user);
            }
        }

        let mut tx = self.store.begin().await?;
        let user = match tx.get::<User>(caller).await? {
            Some(mut user) => {
                let code = compute_invite_code(&user.id);
                tx.patch::<User>(&user.id, json!({ "inviteCode": code })).await?;
                user.invite_code = Some(code);
                debug!("invite code backfilled");
                user
            }
            None => {
                let user = User {
                    id: caller.to_string(),
                    total_points: 0,
                    partner_id: None,
                    invite_code: Some(compute_invite_code(caller)),
                    nick_name: String::new(),
                    avatar_url: String::new(),
                    create_time: Utc::now(),
                };
                tx.insert(&user).await?;
                info!("user created");
                user
            }
        };
        tx.commit().await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(caller = %caller))]
    pub async fn get_or_create(&self, caller: &str) -> Result<Profile> {
        let user = self.ensure_user(caller).await?;

        let partner = match user.partner_id.as_deref() {
            Some(partner_id) => self.store.get::<User>(partner_id).await?.map(|p| PartnerSummary {
                id: p.id,
                nick_name: p.nick_name,
                avatar_url: p.avatar_url,
            }),
            None => None,
        };

        let since = start_of_day(Utc::now()).timestamp_millis();
        let today: Vec<Record> = self
            .store
            .find(&Query::new(Filter::eq("userId", caller).and(Filter::gte("createTime", since))))
            .await?;

        Ok(Profile {
            invite_code: user.invite_code.clone().unwrap_or_else(|| compute_invite_code(&user.id)),
            today_change: today.iter().map(|r| r.amount).sum(),
            partner,
            user,
        })
    }

    #[instrument(skip(self, update), fields(caller = %caller))]
    pub async fn update_profile(&self, caller: &str, update: ProfileUpdate) -> Result<User> {
        let nick_name = update.nick_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let avatar_url = update.avatar_url.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        if nick_name.is_none() && avatar_url.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }
        if nick_name.as_ref().is_some_and(|n| n.chars().count() > MAX_NICK_NAME_CHARS) {
            return Err(DomainError::validation(format!(
                "nickname is limited to {MAX_NICK_NAME_CHARS} characters"
            )));
        }

        let mut patch = serde_json::Map::new();
        if let Some(nick_name) = nick_name {
            patch.insert("nickName".into(), nick_name.into());
        }
        if let Some(avatar_url) = avatar_url {
            patch.insert("avatarUrl".into(), avatar_url.into());
        }

        let mut tx = self.store.begin().await?;
        if tx.get::<User>(caller).await?.is_none() {
            return Err(DomainError::NotFound("user"));
        }
        tx.patch::<User>(caller, patch.into()).await?;
        let user = tx.load::<User>(caller).await?;
        tx.commit().await?;
        info!("profile updated");
        Ok(user)
    }

    /// Ledger history, newest first.
    pub async fn list_records(&self, caller: &str, page: PageRequest) -> Result<Vec<Record>> {
        let query = Query::newest_first(Filter::eq("userId", caller)).page(page.page, page.page_size);
        Ok(self.store.find(&query).await?)
    }

    pub async fn list_notices(&self, caller: &str, unread_only: bool, page: PageRequest) -> Result<Vec<Notice>> {
        let mut filter = Filter::eq("receiverId", caller);
        if unread_only {
            filter = filter.and(Filter::eq("read", false));
        }
        Ok(self.store.find(&Query::newest_first(filter).page(page.page, page.page_size)).await?)
    }

    /// Marks the given notices (all unread ones when `None`) as read.
    /// Notices addressed to someone else are skipped. Returns how many
    /// changed.
    #[instrument(skip(self, notice_ids), fields(caller = %caller))]
    pub async fn mark_notices_read(&self, caller: &str, notice_ids: Option<Vec<String>>) -> Result<usize> {
        let ids = match notice_ids {
            Some(ids) => ids,
            None => {
                let unread: Vec<Notice> = self
                    .store
                    .find(&Query::new(Filter::eq("receiverId", caller).and(Filter::eq("read", false))))
                    .await?;
                unread.into_iter().map(|n| n.id).collect()
            }
        };

        let mut tx = self.store.begin().await?;
        let mut changed = 0;
        for id in &ids {
            match tx.get::<Notice>(id).await? {
                Some(notice) if notice.receiver_id == caller && !notice.read => {
                    tx.patch::<Notice>(id, json!({ "read": true })).await?;
                    changed += 1;
                }
                _ => {}
            }
        }
        tx.commit().await?;
        debug!(changed, "notices marked read");
        Ok(changed)
    }
}
