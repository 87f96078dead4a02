use std::net::SocketAddr;

use agnostic_net::{Net, runtime::RuntimeLite};
use smallvec_wrapper::OneOrMore;

use crate::{
  ServerOptions,
  server::{Server, assemble_answers, find_additionals, ingest_answers},
  types::{Message, Question, Record, RecordType, Response},
  zone::{Zone, now_nanos},
};

const NANOS_PER_SEC: u64 = 1_000_000_000;

async fn srv_answer_pulls_in_addresses<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let srv = Record::srv("stora._ssh._tcp.local.", 60, 0, 0, 22, "stora.local.").unwrap();
  let a = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
  zone.publish(srv.clone()).await;
  zone.publish(a.clone()).await;

  let questions = [Question::any("stora._ssh._tcp.local.".into())];
  let answers = assemble_answers(&zone, &questions).await;
  assert_eq!(&answers[..], &[srv]);

  let additionals = find_additionals(&zone, &answers).await;
  assert_eq!(&additionals[..], &[a]);
}

async fn ptr_answer_expands_recursively<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let ptr = Record::ptr("_ssh._tcp.local.", 60, "stora._ssh._tcp.local.").unwrap();
  let srv = Record::srv("stora._ssh._tcp.local.", 60, 0, 0, 22, "stora.local.").unwrap();
  let a = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
  zone.publish(ptr.clone()).await;
  zone.publish(srv.clone()).await;
  zone.publish(a.clone()).await;

  let questions = [Question::new("_ssh._tcp.local.".into(), RecordType::PTR)];
  let answers = assemble_answers(&zone, &questions).await;
  assert_eq!(&answers[..], &[ptr]);

  // the PTR pulls in the SRV of its target, and the SRV pulls in the A
  let additionals = find_additionals(&zone, &answers).await;
  assert_eq!(&additionals[..], &[srv, a]);
}

async fn ptr_cycle_terminates<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let one = Record::ptr("a._demo._tcp.local.", 60, "b._demo._tcp.local.").unwrap();
  let two = Record::ptr("b._demo._tcp.local.", 60, "a._demo._tcp.local.").unwrap();
  zone.publish(one.clone()).await;
  zone.publish(two.clone()).await;

  let questions = [Question::new("a._demo._tcp.local.".into(), RecordType::PTR)];
  let answers = assemble_answers(&zone, &questions).await;
  assert_eq!(&answers[..], &[one]);

  // b points back at a, which is already in the answers: the walk stops
  let additionals = find_additionals(&zone, &answers).await;
  assert_eq!(&additionals[..], &[two]);
}

async fn questions_are_answered_in_order<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let a = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
  let b = Record::a("router.local.", 60, "192.168.1.254".parse().unwrap()).unwrap();
  zone.publish(a.clone()).await;
  zone.publish(b.clone()).await;

  let questions = [
    Question::any("router.local.".into()),
    Question::any("stora.local.".into()),
  ];
  let answers = assemble_answers(&zone, &questions).await;
  assert_eq!(&answers[..], &[b, a]);
}

async fn nothing_publishable_means_no_response<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  // a record observed from a peer is never answered back onto the wire
  let observed = Record::a("peer.local.", 5, "10.0.0.9".parse().unwrap()).unwrap();
  let resp = Response::new(
    0,
    Vec::new(),
    OneOrMore::from_iter([observed]),
    OneOrMore::new(),
  );
  let msg = Message::decode(&resp.encode().unwrap()).unwrap();
  ingest_answers(&zone, msg, "10.0.0.9:5353".parse().unwrap()).await;

  let questions = [
    Question::any("peer.local.".into()),
    Question::any("no-such-host.local.".into()),
  ];
  let answers = assemble_answers(&zone, &questions).await;
  assert!(answers.is_empty());
}

async fn ingested_answers_become_observed_entries<R: RuntimeLite>() {
  let zone = Zone::<R>::new();
  let from: SocketAddr = "10.0.0.9:5353".parse().unwrap();
  let a = Record::a("peer.local.", 5, "10.0.0.9".parse().unwrap()).unwrap();

  let resp = Response::new(
    0,
    Vec::new(),
    OneOrMore::from_iter([a.clone()]),
    OneOrMore::new(),
  );
  let msg = Message::decode(&resp.encode().unwrap()).unwrap();
  assert!(!msg.is_question());

  let before = now_nanos();
  ingest_answers(&zone, msg, from).await;

  let results = zone.query(Question::any("peer.local.".into())).await;
  let entry = results.recv().await.unwrap();
  assert!(!entry.publish());
  assert_eq!(entry.source(), Some(from));
  assert_eq!(entry.record(), &a);

  // expires five seconds from the moment of ingestion
  assert!(entry.expires() >= before + 5 * NANOS_PER_SEC);
  assert!(entry.expires() <= now_nanos() + 5 * NANOS_PER_SEC);
}

async fn server_start_stop<N: Net>() {
  let zone = Zone::<N::Runtime>::new();
  match Server::<N>::new(zone, ServerOptions::default()) {
    Ok(server) => server.shutdown().await,
    // sandboxes without a multicast-capable interface cannot join the group
    Err(e) => tracing::info!(err=%e, "skipping: multicast unavailable"),
  }
}

test_suites!(tokio {
  srv_answer_pulls_in_addresses,
  ptr_answer_expands_recursively,
  ptr_cycle_terminates,
  questions_are_answered_in_order,
  nothing_publishable_means_no_response,
  ingested_answers_become_observed_entries,
});

test_suites!(smol {
  srv_answer_pulls_in_addresses,
  ptr_answer_expands_recursively,
  ptr_cycle_terminates,
  questions_are_answered_in_order,
  nothing_publishable_means_no_response,
  ingested_answers_become_observed_entries,
});

test_suites!(async_std {
  srv_answer_pulls_in_addresses,
  ptr_answer_expands_recursively,
  ptr_cycle_terminates,
  questions_are_answered_in_order,
  nothing_publishable_means_no_response,
  ingested_answers_become_observed_entries,
});

net_test_suites!(tokio {
  server_start_stop,
});

net_test_suites!(smol {
  server_start_stop,
});

net_test_suites!(async_std {
  server_start_stop,
});
