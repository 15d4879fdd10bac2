//! Notice and push failures never fail the operation that caused them.

use std::sync::Arc;

use domains::{Filter, MockPushGateway, Notice, NoticeType, Query, TaskType};
use integration_tests::*;
use services::PurchaseRequest;
use storage_adapters::MemoryDocumentStore;

#[tokio::test]
async fn refused_notice_writes_do_not_fail_operations() {
    let store = NoticeRefusingStore::wrap(Arc::new(MemoryDocumentStore::new()));
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;

    let task = publish(&svc, ALICE, BOB, TaskType::Reward, 40).await;
    svc.tasks.submit(BOB, &task.id).await.unwrap();
    svc.tasks.confirm(ALICE, &task.id).await.unwrap();
    let item = svc
        .gifts
        .purchase(BOB, PurchaseRequest::Inline { name: "flowers".into(), points: 15, image: None, kind: None })
        .await
        .unwrap();
    svc.gifts.redeem(BOB, &item.id).await.unwrap();

    assert_eq!(balance(&store, BOB).await, 25);
    assert_reconciled(&store, BOB).await;
    let notices: Vec<Notice> = store.find(&Query::new(Filter::all())).await.unwrap();
    assert!(notices.is_empty());
}

#[tokio::test]
async fn failing_push_gateway_is_only_logged() {
    let mut push = MockPushGateway::new();
    push.expect_send().returning(|_| Err(anyhow::anyhow!("device unreachable")));

    let store = memory_store();
    let svc = services_with_push(&store, Arc::new(push));
    paired(&svc, ALICE, BOB).await;

    let task = publish(&svc, ALICE, BOB, TaskType::Penalty, 10).await;
    svc.tasks.confirm(ALICE, &task.id).await.unwrap();
    assert_eq!(balance(&store, BOB).await, -10);

    let notices: Vec<Notice> = store.find(&Query::newest_first(Filter::eq("receiverId", BOB))).await.unwrap();
    let kinds: Vec<NoticeType> = notices.iter().map(|n| n.kind).collect();
    assert!(kinds.contains(&NoticeType::NewTask));
    assert!(kinds.contains(&NoticeType::TaskDone));
}
