//! # Notification emission
//!
//! Notices are projections. [`Notifier::emit`] writes one inside the
//! caller's transaction so it commits together with the state it describes,
//! but a failed insert is logged and dropped: the parent transaction goes on.
//! [`Notifier::dispatch`] forwards committed notices to the push gateway on
//! detached tasks.

use std::sync::Arc;

use chrono::Utc;
use domains::{new_id, Notice, NoticeType, PushGateway, PushMessage, Transaction};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything a notice needs except its bookkeeping fields.
#[derive(Debug, Clone)]
pub struct NoticeDraft {
    pub kind: NoticeType,
    pub title: String,
    pub message: String,
    pub points: i64,
    pub sender_id: String,
    pub receiver_id: String,
}

#[derive(Clone)]
pub struct Notifier {
    push: Arc<dyn PushGateway>,
}

impl Notifier {
    pub fn new(push: Arc<dyn PushGateway>) -> Self {
        Self { push }
    }

    /// Inserts the notice in `tx`. Returns it for [`dispatch`](Self::dispatch)
    /// after commit, or `None` when nothing was written (self-addressed or
    /// the insert failed).
    pub async fn emit(&self, tx: &mut Transaction, draft: NoticeDraft) -> Option<Notice> {
        if draft.receiver_id.is_empty() || draft.sender_id == draft.receiver_id {
            debug!(kind = ?draft.kind, "skipping self-addressed notice");
            return None;
        }

        let notice = Notice {
            id: new_id(),
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            points: draft.points,
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            read: false,
            create_time: Utc::now(),
        };

        match tx.insert(&notice).await {
            Ok(()) => Some(notice),
            Err(err) => {
                warn!(kind = ?notice.kind, receiver = %notice.receiver_id, error = %err, "notice insert failed");
                None
            }
        }
    }

    /// Fire-and-forget push for committed notices. The handles are only
    /// useful to tests; callers drop them.
    pub fn dispatch(&self, notices: impl IntoIterator<Item = Notice>) -> Vec<JoinHandle<()>> {
        notices
            .into_iter()
            .map(|notice| {
                let push = self.push.clone();
                let message = PushMessage {
                    receiver_id: notice.receiver_id,
                    kind: notice.kind,
                    title: notice.title,
                    message: notice.message,
                    points: notice.points,
                };
                tokio::spawn(async move {
                    let receiver = message.receiver_id.clone();
                    if let Err(err) = push.send(message).await {
                        warn!(receiver = %receiver, error = %err, "push dispatch failed");
                    }
                })
            })
            .collect()
    }
}
