//! # Services
//!
//! The transactional state machines. Every mutating operation opens one
//! store transaction, re-reads the documents it depends on inside it,
//! validates, writes, and commits. Notices are written in the same
//! transaction; push delivery happens after commit.
//!
//! Services never read through [`Store`] while holding a [`Transaction`]:
//! single-writer backends would wait on themselves.
//!
//! [`Transaction`]: domains::Transaction

pub mod gifts;
pub mod history;
pub mod ledger;
pub mod notify;
pub mod page;
pub mod pairing;
pub mod tasks;
pub mod users;

use std::sync::Arc;

use domains::{PushGateway, Store};

pub use gifts::{GiftCommand, GiftDraft, GiftService, PurchaseRequest};
pub use history::{HistoryEntry, HistoryFilter, HistoryService, UsageDirection, UsageEntry};
pub use notify::Notifier;
pub use page::{Page, PageRequest};
pub use pairing::{compute_invite_code, BindOutcome, PairingService};
pub use tasks::{NewTask, TaskAction, TaskProgress, TaskService};
pub use users::{PartnerSummary, Profile, ProfileUpdate, UserService};

/// Everything the transport layer needs, wired over one store.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub pairing: PairingService,
    pub tasks: TaskService,
    pub gifts: GiftService,
    pub history: HistoryService,
}

impl Services {
    pub fn new(store: Store, push: Arc<dyn PushGateway>) -> Self {
        let notifier = Notifier::new(push);
        Self {
            users: UserService::new(store.clone()),
            pairing: PairingService::new(store.clone(), notifier.clone()),
            tasks: TaskService::new(store.clone(), notifier.clone()),
            gifts: GiftService::new(store.clone(), notifier),
            history: HistoryService::new(store),
        }
    }
}
