//! Racing operations against one store. Whatever the interleaving, each
//! transition happens once and balances always match the ledger.

use domains::{Conflict, Filter, Query, Record, TaskType, User};
use integration_tests::*;
use services::PurchaseRequest;

fn exactly_one_ok<T, E: std::fmt::Debug>(a: &Result<T, E>, b: &Result<T, E>) {
    assert!(a.is_ok() ^ b.is_ok(), "expected one winner, got {:?} / {:?}", a.as_ref().err(), b.as_ref().err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_confirm_settles_once() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    let task = publish(&svc, ALICE, BOB, TaskType::Reward, 25).await;
    svc.tasks.submit(BOB, &task.id).await.unwrap();

    let (first, second) = tokio::join!(svc.tasks.confirm(ALICE, &task.id), svc.tasks.confirm(ALICE, &task.id));
    exactly_one_ok(&first, &second);
    let loser = first.err().or(second.err()).unwrap();
    assert_eq!(loser.conflict(), Some(Conflict::TaskStatus));

    assert_eq!(balance(&store, BOB).await, 25);
    let records: Vec<Record> = store.find(&Query::new(Filter::eq("taskId", task.id.as_str()))).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_purchases_never_overdraw() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    grant(&svc, ALICE, BOB, 50).await;
    let gift_id = add_gift(&svc, ALICE, "dinner", 40).await;

    let buy = || svc.gifts.purchase(BOB, PurchaseRequest::Catalog { gift_id: gift_id.clone() });
    let (first, second) = tokio::join!(buy(), buy());
    exactly_one_ok(&first, &second);

    assert_eq!(balance(&store, BOB).await, 10);
    assert_eq!(svc.gifts.list_items(BOB).await.unwrap().len(), 1);
    assert_reconciled(&store, BOB).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_redeems_use_the_item_once() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;
    grant(&svc, ALICE, BOB, 10).await;
    let item = svc
        .gifts
        .purchase(BOB, PurchaseRequest::Inline { name: "tea".into(), points: 10, image: None, kind: None })
        .await
        .unwrap();

    let (first, second) = tokio::join!(svc.gifts.redeem(BOB, &item.id), svc.gifts.redeem(BOB, &item.id));
    exactly_one_ok(&first, &second);

    let uses: Vec<Record> = store
        .find(&Query::new(Filter::eq("itemId", item.id.as_str()).and(Filter::eq("type", "gift_use"))))
        .await
        .unwrap();
    assert_eq!(uses.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_suitors_one_partner() {
    let store = memory_store();
    let svc = services(&store);
    create_users(&svc, &[ALICE, BOB, CAROL]).await;

    let code = code_of(ALICE);
    let (bob, carol) = tokio::join!(svc.pairing.bind(BOB, &code), svc.pairing.bind(CAROL, &code));
    exactly_one_ok(&bob, &carol);
    let (winner, loser) = if bob.is_ok() { (BOB, CAROL) } else { (CAROL, BOB) };

    let alice: User = store.get(ALICE).await.unwrap().unwrap();
    let winner: User = store.get(winner).await.unwrap().unwrap();
    let loser: User = store.get(loser).await.unwrap().unwrap();
    assert_eq!(alice.partner_id.as_deref(), Some(winner.id.as_str()));
    assert_eq!(winner.partner_id.as_deref(), Some(ALICE));
    assert_eq!(loser.partner_id, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_settlements_add_up() {
    let store = memory_store();
    let svc = services(&store);
    paired(&svc, ALICE, BOB).await;

    let mut handles = Vec::new();
    for points in 1..=20 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let kind = if points % 4 == 0 { TaskType::Penalty } else { TaskType::Reward };
            let task = publish(&svc, ALICE, BOB, kind, points).await;
            svc.tasks.confirm(ALICE, &task.id).await.map(|t| t.settlement_amount())
        }));
    }

    let mut expected = 0;
    for handle in handles {
        expected += handle.await.unwrap().unwrap();
    }
    assert_eq!(balance(&store, BOB).await, expected);
    assert_reconciled(&store, BOB).await;
    assert_reconciled(&store, ALICE).await;
}
