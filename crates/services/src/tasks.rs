//! # Task state machine
//!
//! ```text
//! pending ──submit──▶ waiting_confirmation ──confirm──▶ done
//! pending ──confirm──▶ done
//! pending | waiting_confirmation ──revoke──▶ revoked
//! done ──revoke──▶ pending (reward) | revoked (penalty)
//! ```
//!
//! Points settle on confirmation for both task types. `Task.settled`
//! records whether the settlement is currently on the target's ledger, and
//! only a settled task is reversed or refunded on revoke.

use chrono::Utc;
use domains::{
    new_id, Conflict, DomainError, Filter, NoticeType, Query, RecordType, Result, Store, Task, TaskStatus,
    TaskType, Transaction, User,
};
use tracing::{debug, info, instrument};

use crate::ledger::{self, Links};
use crate::notify::{NoticeDraft, Notifier};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_POINTS: i64 = 1_000_000;
const LIST_LIMIT: usize = 100;

/// Validated input of `publish`.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub points: i64,
    pub kind: TaskType,
    /// Defaults to the creator for rewards and the partner for penalties.
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Submit,
    Confirm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskProgress {
    Submitted { status: TaskStatus },
    Confirmed { points: i64 },
}

#[derive(Clone)]
pub struct TaskService {
    store: Store,
    notifier: Notifier,
}

async fn load_task(tx: &mut Transaction, task_id: &str) -> Result<Task> {
    tx.get(task_id).await?.ok_or(DomainError::NotFound("task"))
}

impl TaskService {
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, input), fields(caller = %creator, kind = ?input.kind, points = input.points))]
    pub async fn publish(&self, creator: &str, input: NewTask) -> Result<Task> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(format!("title is limited to {MAX_TITLE_CHARS} characters")));
        }
        if input.points <= 0 || input.points > MAX_POINTS {
            return Err(DomainError::validation(format!("points must be between 1 and {MAX_POINTS}")));
        }

        let mut tx = self.store.begin().await?;
        let me: User = tx.get(creator).await?.ok_or(DomainError::NotFound("user"))?;
        let partner = me.partner_id.clone().ok_or(Conflict::NotPaired)?;

        let target_id = match input.target_id.filter(|t| !t.is_empty()) {
            Some(t) if t == me.id || t == partner => t,
            Some(_) => return Err(DomainError::forbidden("tasks can only target you or your partner")),
            None => match input.kind {
                TaskType::Reward => me.id.clone(),
                TaskType::Penalty => partner,
            },
        };

        let task = Task {
            id: new_id(),
            title,
            points: input.points,
            kind: input.kind,
            status: TaskStatus::Pending,
            creator_id: me.id.clone(),
            target_id,
            executor_id: None,
            settled: false,
            create_time: Utc::now(),
            submit_time: None,
            confirm_time: None,
            complete_time: None,
            revoke_time: None,
        };
        tx.insert(&task).await?;

        let draft = NoticeDraft {
            kind: NoticeType::NewTask,
            title: match task.kind {
                TaskType::Reward => "New task".into(),
                TaskType::Penalty => "New penalty task".into(),
            },
            message: task.title.clone(),
            points: task.settlement_amount(),
            sender_id: task.creator_id.clone(),
            receiver_id: task.target_id.clone(),
        };
        let notice = self.notifier.emit(&mut tx, draft).await;
        tx.commit().await?;
        self.notifier.dispatch(notice);

        info!(task_id = %task.id, target = %task.target_id, "task published");
        Ok(task)
    }

    /// `pending → waiting_confirmation`. The target, the recorded executor
    /// or the creator may submit.
    #[instrument(skip(self), fields(caller = %actor))]
    pub async fn submit(&self, actor: &str, task_id: &str) -> Result<Task> {
        let mut tx = self.store.begin().await?;
        let mut task = load_task(&mut tx, task_id).await?;

        let may_submit =
            task.target_id == actor || task.executor_id.as_deref() == Some(actor) || task.creator_id == actor;
        if !may_submit {
            return Err(DomainError::forbidden("only the task's target can submit it"));
        }
        if task.status != TaskStatus::Pending {
            debug!(status = ?task.status, "submit rejected");
            return Err(Conflict::TaskStatus.into());
        }

        task.status = TaskStatus::WaitingConfirmation;
        task.submit_time = Some(Utc::now());
        if actor != task.creator_id {
            task.executor_id = Some(actor.to_string());
        }
        tx.replace(&task).await?;

        let draft = NoticeDraft {
            kind: NoticeType::TaskSubmitted,
            title: "Task submitted".into(),
            message: format!("please confirm: {}", task.title),
            points: 0,
            sender_id: actor.to_string(),
            receiver_id: task.creator_id.clone(),
        };
        let notice = self.notifier.emit(&mut tx, draft).await;
        tx.commit().await?;
        self.notifier.dispatch(notice);

        info!(task_id, "task submitted");
        Ok(task)
    }

    /// `waiting_confirmation | pending → done`, settling the points on the
    /// target. Creator only. The status check and the settlement share one
    /// transaction, so a second confirm always fails.
    #[instrument(skip(self), fields(caller = %actor))]
    pub async fn confirm(&self, actor: &str, task_id: &str) -> Result<Task> {
        let mut tx = self.store.begin().await?;
        let mut task = load_task(&mut tx, task_id).await?;

        if task.creator_id != actor {
            return Err(DomainError::forbidden("only the task's creator can confirm it"));
        }
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::WaitingConfirmation) {
            debug!(status = ?task.status, "confirm rejected");
            return Err(Conflict::TaskStatus.into());
        }

        let beneficiary = task.beneficiary().to_string();
        let (reason, kind) = match task.kind {
            TaskType::Reward => (task.title.clone(), RecordType::TaskDone),
            TaskType::Penalty => (format!("[penalty] {}", task.title), RecordType::Penalty),
        };
        let links = Links { task_id: Some(task.id.clone()), ..Links::default() };
        ledger::apply_delta(&mut tx, &beneficiary, task.settlement_amount(), reason, kind, links).await?;

        let now = Utc::now();
        task.status = TaskStatus::Done;
        task.settled = true;
        task.confirm_time = Some(now);
        task.complete_time = Some(now);
        tx.replace(&task).await?;

        let draft = NoticeDraft {
            kind: NoticeType::TaskDone,
            title: "Task completed".into(),
            message: task.title.clone(),
            points: task.settlement_amount(),
            sender_id: actor.to_string(),
            receiver_id: beneficiary,
        };
        let notice = self.notifier.emit(&mut tx, draft).await;
        tx.commit().await?;
        self.notifier.dispatch(notice);

        info!(task_id, amount = task.settlement_amount(), "task confirmed");
        Ok(task)
    }

    /// `submitOrConfirmTask`: with no explicit action the creator confirms
    /// and anyone else submits.
    pub async fn advance(&self, actor: &str, task_id: &str, action: Option<TaskAction>) -> Result<TaskProgress> {
        let action = match action {
            Some(action) => action,
            None => {
                let task: Task = self.store.get(task_id).await?.ok_or(DomainError::NotFound("task"))?;
                if task.creator_id == actor {
                    TaskAction::Confirm
                } else {
                    TaskAction::Submit
                }
            }
        };
        match action {
            TaskAction::Submit => {
                let task = self.submit(actor, task_id).await?;
                Ok(TaskProgress::Submitted { status: task.status })
            }
            TaskAction::Confirm => {
                let task = self.confirm(actor, task_id).await?;
                Ok(TaskProgress::Confirmed { points: task.points })
            }
        }
    }

    /// Creator only; fails on an already revoked task. A settled reward is
    /// reversed and reopened as `pending`; everything else ends `revoked`,
    /// with a settled penalty refunded.
    #[instrument(skip(self), fields(caller = %actor))]
    pub async fn revoke(&self, actor: &str, task_id: &str) -> Result<Task> {
        let mut tx = self.store.begin().await?;
        let mut task = load_task(&mut tx, task_id).await?;

        if task.creator_id != actor {
            return Err(DomainError::forbidden("only the task's creator can revoke it"));
        }
        if task.status == TaskStatus::Revoked {
            return Err(Conflict::AlreadyRevoked.into());
        }

        let beneficiary = task.beneficiary().to_string();
        let reversal = if task.settled { -task.settlement_amount() } else { 0 };
        if task.settled {
            let links = Links { task_id: Some(task.id.clone()), ..Links::default() };
            let reason = format!("[revoke] {}", task.title);
            ledger::apply_delta(&mut tx, &beneficiary, reversal, reason, RecordType::Revoke, links).await?;
        }

        let reopen = task.kind == TaskType::Reward && task.status == TaskStatus::Done;
        task.status = if reopen { TaskStatus::Pending } else { TaskStatus::Revoked };
        task.settled = false;
        task.revoke_time = Some(Utc::now());
        if reopen {
            task.submit_time = None;
            task.confirm_time = None;
            task.complete_time = None;
        }
        tx.replace(&task).await?;

        let draft = NoticeDraft {
            kind: NoticeType::TaskRevoked,
            title: "Task revoked".into(),
            message: task.title.clone(),
            points: reversal,
            sender_id: actor.to_string(),
            receiver_id: beneficiary,
        };
        let notice = self.notifier.emit(&mut tx, draft).await;
        tx.commit().await?;
        self.notifier.dispatch(notice);

        info!(task_id, reversal, status = ?task.status, "task revoked");
        Ok(task)
    }

    /// Tasks the caller created or is targeted by, newest first.
    pub async fn list(&self, caller: &str) -> Result<Vec<Task>> {
        let filter = Filter::Or(vec![Filter::eq("creatorId", caller), Filter::eq("targetId", caller)]);
        Ok(self.store.find(&Query::newest_first(filter).limit(LIST_LIMIT)).await?)
    }
}
