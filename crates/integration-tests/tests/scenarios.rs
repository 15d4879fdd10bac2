use domains::{Conflict, DomainError, Filter, Item, ItemStatus, Query, Record, RecordType, Task, TaskStatus, TaskType, User};
use integration_tests::*;
use services::{HistoryFilter, PageRequest, PurchaseRequest, TaskAction, TaskProgress};

#[tokio::test]
async fn reward_lifecycle_with_revoke_and_redo() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;

    let task = publish(&svc, ALICE, BOB, TaskType::Reward, 30).await;
    let progress = svc.tasks.advance(BOB, &task.id, None).await.unwrap();
    assert_eq!(progress, TaskProgress::Submitted { status: TaskStatus::WaitingConfirmation });
    let progress = svc.tasks.advance(ALICE, &task.id, None).await.unwrap();
    assert_eq!(progress, TaskProgress::Confirmed { points: 30 });
    assert_eq!(balance(&store, BOB).await, 30);

    let reopened = svc.tasks.revoke(ALICE, &task.id).await.unwrap();
    assert_eq!(reopened.status, TaskStatus::Pending);
    assert!(!reopened.settled);
    assert_eq!(balance(&store, BOB).await, 0);

    // A reopened reward can be completed again.
    svc.tasks.advance(ALICE, &task.id, Some(TaskAction::Confirm)).await.unwrap();
    assert_eq!(balance(&store, BOB).await, 30);

    let records: Vec<Record> = store.find(&Query::new(Filter::eq("taskId", task.id.as_str()))).await.unwrap();
    let mut amounts: Vec<i64> = records.iter().map(|r| r.amount).collect();
    amounts.sort_unstable();
    assert_eq!(amounts, vec![-30, 30, 30]);
    assert!(records.iter().any(|r| r.kind == RecordType::Revoke && r.reason.starts_with("[revoke] ")));
    assert_reconciled(&store, BOB).await;
}

#[tokio::test]
async fn penalty_settles_on_confirm_and_refunds_on_revoke() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;

    let task = publish(&svc, ALICE, BOB, TaskType::Penalty, 20).await;
    assert_eq!(balance(&store, BOB).await, 0, "publishing moves no points");

    svc.tasks.confirm(ALICE, &task.id).await.unwrap();
    assert_eq!(balance(&store, BOB).await, -20);

    let revoked = svc.tasks.revoke(ALICE, &task.id).await.unwrap();
    assert_eq!(revoked.status, TaskStatus::Revoked);
    assert_eq!(balance(&store, BOB).await, 0);

    let err = svc.tasks.revoke(ALICE, &task.id).await.unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::AlreadyRevoked));
    assert_eq!(balance(&store, BOB).await, 0);
    assert_reconciled(&store, BOB).await;
}

#[tokio::test]
async fn revoking_an_unsettled_task_moves_no_points() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;

    let task = publish(&svc, ALICE, BOB, TaskType::Reward, 15).await;
    svc.tasks.submit(BOB, &task.id).await.unwrap();
    let revoked = svc.tasks.revoke(ALICE, &task.id).await.unwrap();
    assert_eq!(revoked.status, TaskStatus::Revoked);

    let records: Vec<Record> = store.find(&Query::new(Filter::eq("userId", BOB))).await.unwrap();
    assert!(records.is_empty());
    let err = svc.tasks.confirm(ALICE, &task.id).await.unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::TaskStatus));
}

#[tokio::test]
async fn purchases_need_funds_and_items_redeem_once() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    grant(&svc, ALICE, BOB, 50).await;
    let gift_id = add_gift(&svc, ALICE, "massage", 40).await;

    let item = svc.gifts.purchase(BOB, PurchaseRequest::Catalog { gift_id: gift_id.clone() }).await.unwrap();
    assert_eq!(item.points, 40);
    assert_eq!(item.gift_id.as_deref(), Some(gift_id.as_str()));
    assert_eq!(balance(&store, BOB).await, 10);

    let purchase: Record = store.get(item.purchase_record_id.as_deref().unwrap()).await.unwrap().unwrap();
    assert_eq!(purchase.amount, -40);
    assert_eq!(purchase.reason, "exchange: massage");
    assert_eq!(purchase.item_id.as_deref(), Some(item.id.as_str()));

    let err = svc.gifts.purchase(BOB, PurchaseRequest::Catalog { gift_id }).await.unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::InsufficientPoints));
    assert_eq!(balance(&store, BOB).await, 10);
    assert_eq!(svc.gifts.list_items(BOB).await.unwrap().len(), 1);

    let err = svc.gifts.redeem(ALICE, &item.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound("item")));

    let used = svc.gifts.redeem(BOB, &item.id).await.unwrap();
    assert_eq!(used.status, ItemStatus::Used);
    let err = svc.gifts.redeem(BOB, &item.id).await.unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::ItemAlreadyUsed));

    let stored: Item = store.get(&item.id).await.unwrap().unwrap();
    assert!(stored.use_time.is_some());
    assert_eq!(balance(&store, BOB).await, 10, "redeeming is free");
    assert_reconciled(&store, BOB).await;

    let history = svc.history.exchange_history(BOB, HistoryFilter::Used, PageRequest::new(None, None, 20)).await.unwrap();
    assert_eq!(history.total, 1);
    let entry = &history.data[0];
    assert_eq!(entry.id, item.id);
    assert!(!entry.ambiguous);
    assert_eq!(entry.use_record.as_ref().map(|u| u.receiver.as_str()), Some("partner"));
}

#[tokio::test]
async fn catalog_edits_do_not_touch_owned_items() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    grant(&svc, ALICE, BOB, 100).await;
    let gift_id = add_gift(&svc, ALICE, "movie night", 30).await;
    let item = svc.gifts.purchase(BOB, PurchaseRequest::Catalog { gift_id: gift_id.clone() }).await.unwrap();

    svc.gifts.upsert(BOB, services::GiftCommand::Delete { gift_id }).await.unwrap();
    let kept: Item = store.get(&item.id).await.unwrap().unwrap();
    assert_eq!(kept.name, "movie night");
    svc.gifts.redeem(BOB, &item.id).await.unwrap();
}

#[tokio::test]
async fn pairing_is_exclusive() {
    let store = memory_store();
    let svc = services(&store);
    create_users(&svc, &[ALICE, BOB, CAROL]).await;

    svc.pairing.bind(BOB, &code_of(ALICE)).await.unwrap();
    let err = svc.pairing.bind(CAROL, &code_of(ALICE)).await.unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::PartnerHasPartner));

    let carol: User = store.get(CAROL).await.unwrap().unwrap();
    assert_eq!(carol.partner_id, None);
    let alice: User = store.get(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.partner_id.as_deref(), Some(BOB));

    let err = svc
        .tasks
        .publish(CAROL, services::NewTask { title: "solo".into(), points: 5, kind: TaskType::Reward, target_id: None })
        .await
        .unwrap_err();
    assert_eq!(err.conflict(), Some(Conflict::NotPaired));
}

#[tokio::test]
async fn tasks_are_listed_for_creator_and_target_only() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    create_users(&svc, &[CAROL]).await;

    publish(&svc, ALICE, BOB, TaskType::Reward, 5).await;
    publish(&svc, ALICE, ALICE, TaskType::Reward, 5).await;

    assert_eq!(svc.tasks.list(ALICE).await.unwrap().len(), 2);
    let bobs: Vec<Task> = svc.tasks.list(BOB).await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert!(svc.tasks.list(CAROL).await.unwrap().is_empty());
}
