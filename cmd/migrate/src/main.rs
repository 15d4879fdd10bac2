//! # migrate
//!
//! One-shot maintenance over the configured store:
//!
//! - gifts without a `partnerId` snapshot get their creator's current partner
//! - users without a stored invite code get one
//! - `--check-ledger` also compares every balance with its records
//!
//! Safe to run repeatedly; documents already migrated are skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use domains::{Filter, Gift, Query, Store, User};
use serde::Serialize;
use serde_json::json;
use services::{compute_invite_code, ledger};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
struct Report {
    total: usize,
    updated: usize,
    skipped: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = configs::load().context("loading configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)))
        .init();
    let check_ledger = std::env::args().skip(1).any(|arg| arg == "--check-ledger");

    let store = open_store(&config).await?;
    let gifts = backfill_gift_partners(&store).await?;
    info!(?gifts, "gift partner snapshots");
    let users = backfill_invite_codes(&store).await?;
    info!(?users, "invite codes");

    let mut output = json!({ "success": true, "gifts": gifts, "users": users });
    if check_ledger {
        output["ledgerDrift"] = json!(ledger_drift(&store).await?);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(feature = "db-sqlite")]
async fn open_store(config: &configs::AppConfig) -> anyhow::Result<Store> {
    if config.database.is_memory() {
        bail!("nothing to migrate in the in-memory store");
    }
    let sqlite = storage_adapters::SqliteDocumentStore::connect(&config.database.url, &config.env).await?;
    Ok(Store::new(Arc::new(sqlite)))
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_store(_config: &configs::AppConfig) -> anyhow::Result<Store> {
    bail!("migrate needs the db-sqlite feature")
}

async fn backfill_gift_partners(store: &Store) -> anyhow::Result<Report> {
    let total = store.count::<Gift>(Filter::all()).await?;
    let pending: Vec<Gift> = store.find(&Query::new(Filter::missing("partnerId"))).await?;
    let mut report = Report { total, skipped: total.saturating_sub(pending.len()), ..Report::default() };

    for gift in pending {
        match snapshot_partner(store, gift).await {
            Ok(()) => report.updated += 1,
            Err(err) => {
                warn!(error = %err, "gift not migrated");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

async fn snapshot_partner(store: &Store, mut gift: Gift) -> anyhow::Result<()> {
    let mut tx = store.begin().await?;
    let creator: User = tx
        .get(&gift.creator_id)
        .await?
        .with_context(|| format!("gift {} has unknown creator {}", gift.id, gift.creator_id))?;
    gift.partner_id = creator.partner_id;
    // Replacing writes `partnerId` even when it is null, so the gift is not
    // picked up again.
    tx.replace(&gift).await?;
    tx.commit().await?;
    Ok(())
}

async fn backfill_invite_codes(store: &Store) -> anyhow::Result<Report> {
    let users: Vec<User> = store.find(&Query::new(Filter::all())).await?;
    let mut report = Report { total: users.len(), ..Report::default() };

    for user in users {
        if user.invite_code.is_some() {
            report.skipped += 1;
            continue;
        }
        let result = async {
            let mut tx = store.begin().await?;
            tx.patch::<User>(&user.id, json!({ "inviteCode": compute_invite_code(&user.id) })).await?;
            tx.commit().await
        }
        .await;
        match result {
            Ok(()) => report.updated += 1,
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "invite code not backfilled");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Users whose balance differs from the sum of their records.
async fn ledger_drift(store: &Store) -> anyhow::Result<BTreeMap<String, i64>> {
    let users: Vec<User> = store.find(&Query::new(Filter::all())).await?;
    let mut drifted = BTreeMap::new();
    for user in users {
        let rec = ledger::reconcile(store, &user.id).await?;
        if rec.drift() != 0 {
            warn!(user_id = %user.id, balance = rec.balance, ledger = rec.ledger_sum, "balance drift");
            drifted.insert(user.id, rec.drift());
        }
    }
    Ok(drifted)
}
