use core::time::Duration;

use agnostic_net::runtime::RuntimeLite;
use futures::StreamExt;

use crate::{
  types::{Question, Record, RecordType},
  zone::{Entry, Zone},
};

async fn publish_then_query<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let record = Record::a("router.local.", 60, "192.168.1.254".parse().unwrap()).unwrap();
  zone.publish(record.clone()).await;

  let results = zone
    .query(Question::new("router.local.".into(), RecordType::A))
    .await;
  let entry = results.recv().await.unwrap();
  assert!(entry.publish());
  assert!(entry.source().is_none());
  assert_eq!(entry.record(), &record);

  // drained and closed
  assert!(results.recv().await.is_err());
}

async fn query_empty_zone_closes_channel<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let results = zone
    .query(Question::any("no-such-host.local.".into()))
    .await;
  assert!(results.recv().await.is_err());
}

async fn duplicate_publish_is_dropped<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let record = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
  zone.publish(record.clone()).await;
  // identity ignores the TTL, so this is the same record
  zone
    .publish(Record::a("stora.local.", 3600, "192.168.1.200".parse().unwrap()).unwrap())
    .await;

  let results = zone.query(Question::any("stora.local.".into())).await;
  assert_eq!(results.recv().await.unwrap().record(), &record);
  assert!(results.recv().await.is_err());
}

async fn any_query_returns_every_type<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let a = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
  let txt = Record::txt("stora.local.", 60, ["model=shiny".into()]).unwrap();
  zone.publish(a.clone()).await;
  zone.publish(txt.clone()).await;

  let results = zone.query(Question::any("stora.local.".into())).await;
  // insertion order
  assert_eq!(results.recv().await.unwrap().record(), &a);
  assert_eq!(results.recv().await.unwrap().record(), &txt);
  assert!(results.recv().await.is_err());

  // a typed query only sees its own type
  let results = zone
    .query(Question::new("stora.local.".into(), RecordType::TXT))
    .await;
  assert_eq!(results.recv().await.unwrap().record(), &txt);
  assert!(results.recv().await.is_err());
}

async fn subscription_delivery<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let browse = zone.subscribe_type(RecordType::ANY).await;
  let mut browse = core::pin::pin!(browse);

  let record = Record::a("router.local.", 60, "192.168.1.254".parse().unwrap()).unwrap();
  zone.publish(record.clone()).await;

  let entry = browse.next().await.unwrap();
  assert_eq!(entry.record(), &record);
  assert_eq!(entry.instance(), "router");
}

async fn subscription_filters_by_type<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let browse = zone.subscribe_type(RecordType::PTR).await;

  zone
    .publish(Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap())
    .await;
  let ptr = Record::ptr("_ssh._tcp.local.", 60, "stora._ssh._tcp.local.").unwrap();
  zone.publish(ptr.clone()).await;

  // the A record was filtered out, the PTR is the first delivery
  assert_eq!(browse.recv().await.unwrap().record(), &ptr);
}

async fn stuck_subscriber_does_not_block_the_zone<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  // never drained; its channel fills after 16 deliveries
  let browse = zone.subscribe_type(RecordType::A).await;

  for i in 0..64 {
    let record = Record::a(&format!("host{i}.local."), 60, "192.168.1.1".parse().unwrap()).unwrap();
    zone.publish(record).await;
  }

  // adds and queries still complete
  let results = zone.query(Question::any("host63.local.".into())).await;
  assert!(results.recv().await.is_ok());
  assert!(results.recv().await.is_err());

  // the earliest deliveries survived, the overflow was dropped
  assert_eq!(browse.recv().await.unwrap().instance(), "host0");
}

async fn expired_entries_are_swept<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let record = Record::a("peer.local.", 0, "10.0.0.9".parse().unwrap()).unwrap();
  zone
    .add(Entry::observed(record, "10.0.0.9:5353".parse().unwrap()))
    .await;

  // a TTL of zero expires immediately; the sweeper runs once a second
  R::sleep(Duration::from_millis(2000)).await;

  let results = zone.query(Question::any("peer.local.".into())).await;
  assert!(results.recv().await.is_err());
}

#[test]
fn entry_display_parts() {
  let record = Record::srv("stora._ssh._tcp.local.", 60, 0, 0, 22, "stora.local.").unwrap();
  let entry = Entry::local(record);
  assert_eq!(entry.instance(), "stora");
  assert_eq!(entry.type_label(), "_ssh._tcp.");
  assert_eq!(entry.domain(), "local.");
}

test_suites!(tokio {
  publish_then_query,
  query_empty_zone_closes_channel,
  duplicate_publish_is_dropped,
  any_query_returns_every_type,
  subscription_delivery,
  subscription_filters_by_type,
  stuck_subscriber_does_not_block_the_zone,
  expired_entries_are_swept,
});

test_suites!(smol {
  publish_then_query,
  query_empty_zone_closes_channel,
  duplicate_publish_is_dropped,
  any_query_returns_every_type,
  subscription_delivery,
  subscription_filters_by_type,
  stuck_subscriber_does_not_block_the_zone,
  expired_entries_are_swept,
});

test_suites!(async_std {
  publish_then_query,
  query_empty_zone_closes_channel,
  duplicate_publish_is_dropped,
  any_query_returns_every_type,
  subscription_delivery,
  subscription_filters_by_type,
  stuck_subscriber_does_not_block_the_zone,
  expired_entries_are_swept,
});
