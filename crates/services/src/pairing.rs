//! # Pairing
//!
//! Establishes the symmetric one-to-one partner link. The invite code is
//! resolved through the indexed `inviteCode` field before the transaction;
//! both users are then re-read inside it and every check runs against those
//! fresh copies.

use domains::{Conflict, DomainError, Filter, NoticeType, Query, Result, SortOrder, Store, User};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::notify::{NoticeDraft, Notifier};

pub const INVITE_CODE_LEN: usize = 6;

/// Last [`INVITE_CODE_LEN`] characters of the identity, uppercased.
pub fn compute_invite_code(user_id: &str) -> String {
    let chars: Vec<char> = user_id.chars().collect();
    let start = chars.len().saturating_sub(INVITE_CODE_LEN);
    chars[start..].iter().collect::<String>().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Bound { partner_id: String },
    /// Both sides already pointed at each other. Nothing was written.
    AlreadyBound { partner_id: String },
    /// One side pointed at the other; the missing half was written.
    Repaired { partner_id: String },
}

impl BindOutcome {
    pub fn partner_id(&self) -> &str {
        match self {
            Self::Bound { partner_id } | Self::AlreadyBound { partner_id } | Self::Repaired { partner_id } => {
                partner_id
            }
        }
    }
}

#[derive(Clone)]
pub struct PairingService {
    store: Store,
    notifier: Notifier,
}

impl PairingService {
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Finds the user owning `code`, never the caller.
    async fn resolve_code(&self, caller: &str, code: &str) -> Result<String> {
        let query = Query::new(Filter::eq("inviteCode", code).and(Filter::ne("id", caller)))
            .order_by("createTime", SortOrder::Asc)
            .limit(2);
        let matches: Vec<User> = self.store.find(&query).await?;
        if matches.len() > 1 {
            debug!(code, "invite code collision, taking the oldest user");
        }
        matches
            .into_iter()
            .next()
            .map(|u| u.id)
            .ok_or(Conflict::CodeNotFound.into())
    }

    #[instrument(skip(self), fields(caller = %caller))]
    pub async fn bind(&self, caller: &str, partner_code: &str) -> Result<BindOutcome> {
        let code = partner_code.trim().to_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("partner code is required"));
        }
        let target_id = self.resolve_code(caller, &code).await?;

        let mut tx = self.store.begin().await?;
        let me: User = tx.get(caller).await?.ok_or(DomainError::NotFound("user"))?;
        let target: User = tx.get(&target_id).await?.ok_or(Conflict::CodeNotFound)?;

        if me.is_paired_with(&target.id) && target.is_paired_with(&me.id) {
            debug!(partner = %target.id, "already bound");
            return Ok(BindOutcome::AlreadyBound { partner_id: target.id });
        }
        if me.partner_id.as_ref().is_some_and(|p| *p != target.id) {
            return Err(Conflict::CallerHasPartner.into());
        }
        if target.partner_id.as_ref().is_some_and(|p| *p != me.id) {
            return Err(Conflict::PartnerHasPartner.into());
        }

        // At most one half exists here, and it points at the other side.
        let repaired = me.partner_id.is_some() || target.partner_id.is_some();
        if me.partner_id.is_none() {
            tx.patch::<User>(&me.id, json!({ "partnerId": target.id })).await?;
        }
        if target.partner_id.is_none() {
            tx.patch::<User>(&target.id, json!({ "partnerId": me.id })).await?;
        }

        let draft = NoticeDraft {
            kind: NoticeType::BindSuccess,
            title: "Partner bound".into(),
            message: format!(
                "{} is now your partner",
                if me.nick_name.is_empty() { "Your partner" } else { me.nick_name.as_str() }
            ),
            points: 0,
            sender_id: me.id.clone(),
            receiver_id: target.id.clone(),
        };
        let notice = self.notifier.emit(&mut tx, draft).await;
        tx.commit().await?;
        self.notifier.dispatch(notice);

        info!(partner = %target.id, repaired, "partners bound");
        Ok(if repaired {
            BindOutcome::Repaired { partner_id: target.id }
        } else {
            BindOutcome::Bound { partner_id: target.id }
        })
    }
}
