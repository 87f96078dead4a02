use core::{
  marker::PhantomData,
  pin::Pin,
  task::{Context, Poll},
};
use std::{
  collections::HashMap,
  net::SocketAddr,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use agnostic_net::runtime::RuntimeLite;
use async_channel::{Receiver, Sender, TrySendError};
use futures::{FutureExt, Stream};

use super::types::{Name, Question, Record, RecordType};

/// Capacity of the zone's inbound add/query/subscribe channels.
const INBOUND_CAP: usize = 16;
/// Capacity of per-query result channels and subscription channels.
const RESULT_CAP: usize = 16;
/// How often the mainloop evicts entries whose deadline passed.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NEVER_EXPIRES: u64 = u64::MAX;

pub(crate) fn now_nanos() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_nanos() as u64)
    .unwrap_or(0)
}

/// A stored resource record plus its administrative metadata: the expiry
/// deadline, whether the local host authoritatively owns it, and the peer
/// it was observed from.
#[derive(Debug, Clone)]
pub struct Entry {
  expires: u64,
  publish: bool,
  record: Record,
  source: Option<SocketAddr>,
}

impl Entry {
  /// An entry the local host owns: answered on the wire, never expires.
  pub(crate) fn local(record: Record) -> Self {
    Self {
      expires: NEVER_EXPIRES,
      publish: true,
      record,
      source: None,
    }
  }

  /// An entry observed from a peer: kept for the record's TTL, never
  /// answered on the wire.
  pub(crate) fn observed(record: Record, source: SocketAddr) -> Self {
    let expires = now_nanos().saturating_add(record.ttl() as u64 * NANOS_PER_SEC);
    Self {
      expires,
      publish: false,
      record,
      source: Some(source),
    }
  }

  /// Returns the resource record.
  #[inline]
  pub const fn record(&self) -> &Record {
    &self.record
  }

  /// Consumes the entry and returns the resource record.
  #[inline]
  pub fn into_record(self) -> Record {
    self.record
  }

  /// Whether the local host answers multicast questions with this entry.
  #[inline]
  pub const fn publish(&self) -> bool {
    self.publish
  }

  /// The absolute expiry deadline, in nanoseconds since the UNIX epoch.
  #[inline]
  pub const fn expires(&self) -> u64 {
    self.expires
  }

  /// The peer address the record arrived from, if it was observed.
  #[inline]
  pub const fn source(&self) -> Option<SocketAddr> {
    self.source
  }

  /// The owner name of the record.
  #[inline]
  pub fn fqdn(&self) -> &Name {
    self.record.name()
  }

  /// The instance part of the owner name: the text before the first dot.
  pub fn instance(&self) -> &str {
    self.fqdn().as_str().split('.').next().unwrap_or("")
  }

  /// The domain suffix the zone serves.
  #[inline]
  pub fn domain(&self) -> &'static str {
    "local."
  }

  /// The service part of the owner name, between the instance and the
  /// domain suffix (e.g. `_ssh._tcp.` for `stora._ssh._tcp.local.`).
  /// Display-only; assumes the owner sits under `local.`.
  pub fn type_label(&self) -> &str {
    let fqdn = self.fqdn().as_str();
    let start = self.instance().len() + 1;
    let end = fqdn.len().saturating_sub(self.domain().len());
    fqdn.get(start..end).unwrap_or("")
  }

  #[inline]
  fn is_expired(&self, now: u64) -> bool {
    self.expires < now
  }
}

struct QueryRequest {
  question: Question,
  result: Sender<Entry>,
}

struct Subscription {
  question: Question,
  result: Sender<Entry>,
}

pin_project_lite::pin_project! {
  /// A stream of entries delivered to a subscriber as they are added to
  /// the zone.
  ///
  /// Delivery on the zone side is non-blocking: a subscriber that falls
  /// more than the channel capacity behind loses notifications instead
  /// of stalling the zone.
  pub struct Browse {
    #[pin]
    entry_rx: Receiver<Entry>,
  }
}

impl Browse {
  /// Receives the next matching entry.
  pub async fn recv(&self) -> Result<Entry, async_channel::RecvError> {
    self.entry_rx.recv().await
  }
}

impl Stream for Browse {
  type Item = Entry;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.project().entry_rx.poll_next(cx)
  }
}

/// The authoritative in-memory record store for the `local.` link.
///
/// A `Zone` is a cheap handle over the store's inbound channels; the
/// store itself is owned by a mainloop task spawned on creation, which
/// serialises every add, query and subscription. Cloning the handle
/// shares the same store.
pub struct Zone<R> {
  add_tx: Sender<Entry>,
  query_tx: Sender<QueryRequest>,
  subscribe_tx: Sender<Subscription>,
  _r: PhantomData<R>,
}

impl<R> Clone for Zone<R> {
  fn clone(&self) -> Self {
    Self {
      add_tx: self.add_tx.clone(),
      query_tx: self.query_tx.clone(),
      subscribe_tx: self.subscribe_tx.clone(),
      _r: PhantomData,
    }
  }
}

impl<R: RuntimeLite> Default for Zone<R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<R: RuntimeLite> Zone<R> {
  /// Creates a new zone and spawns its mainloop.
  ///
  /// Must be called from within the runtime. The mainloop runs until
  /// every handle to the zone has been dropped.
  pub fn new() -> Self {
    let (add_tx, add_rx) = async_channel::bounded(INBOUND_CAP);
    let (query_tx, query_rx) = async_channel::bounded(INBOUND_CAP);
    let (subscribe_tx, subscribe_rx) = async_channel::bounded(INBOUND_CAP);

    R::spawn_detach(
      ZoneInner {
        entries: HashMap::new(),
        subscriptions: Vec::new(),
        add_rx,
        query_rx,
        subscribe_rx,
      }
      .mainloop::<R>(),
    );

    Self {
      add_tx,
      query_tx,
      subscribe_tx,
      _r: PhantomData,
    }
  }

  /// Publishes a record the local host owns. The record is answered in
  /// response to matching multicast questions until process exit.
  ///
  /// Re-publishing a record that is already present (same type, class
  /// and rdata) is a no-op.
  pub async fn publish(&self, record: Record) {
    self.add(Entry::local(record)).await;
  }

  /// Enqueues an entry for insertion.
  pub(crate) async fn add(&self, entry: Entry) {
    let _ = self.add_tx.send(entry).await;
  }

  /// Queries the current entries for `question.name()`.
  ///
  /// Every matching entry is delivered in insertion order on the
  /// returned channel, which is closed once the zone has drained the
  /// matches (immediately, if nothing matches).
  pub async fn query(&self, question: Question) -> Receiver<Entry> {
    let (result, rx) = async_channel::bounded(RESULT_CAP);
    let _ = self.query_tx.send(QueryRequest { question, result }).await;
    rx
  }

  /// Subscribes to entries added to the zone from now on.
  ///
  /// The filter matches on record type only (`ANY` matches everything);
  /// the subscription lasts until the returned [`Browse`] is dropped.
  pub async fn subscribe(&self, question: Question) -> Browse {
    let (result, entry_rx) = async_channel::bounded(RESULT_CAP);
    let _ = self.subscribe_tx.send(Subscription { question, result }).await;
    Browse { entry_rx }
  }

  /// Subscribes to every new entry whose record type is `ty`.
  pub async fn subscribe_type(&self, ty: RecordType) -> Browse {
    self.subscribe(Question::type_filter(ty)).await
  }
}

enum Event {
  Add(Entry),
  Query(QueryRequest),
  Subscribe(Subscription),
  Sweep,
  Closed,
}

/// The store behind a [`Zone`] handle. Owned exclusively by the mainloop
/// task; nothing else ever touches the map.
struct ZoneInner {
  entries: HashMap<Name, Vec<Entry>>,
  subscriptions: Vec<Subscription>,
  add_rx: Receiver<Entry>,
  query_rx: Receiver<QueryRequest>,
  subscribe_rx: Receiver<Subscription>,
}

impl ZoneInner {
  async fn mainloop<R: RuntimeLite>(mut self) {
    'running: loop {
      let sweep = R::sleep(SWEEP_INTERVAL);
      futures::pin_mut!(sweep);

      loop {
        // The three inbound channels are drained in a fixed bias order:
        // subscriptions are installed before pending adds are applied,
        // and pending adds are applied before a query is answered. A
        // query enqueued after an add therefore observes that add, and
        // a subscription enqueued before an add receives its
        // notification, even though they travel on distinct channels.
        let event = futures::select_biased! {
          sub = self.subscribe_rx.recv().fuse() => sub.map(Event::Subscribe).unwrap_or(Event::Closed),
          entry = self.add_rx.recv().fuse() => entry.map(Event::Add).unwrap_or(Event::Closed),
          req = self.query_rx.recv().fuse() => req.map(Event::Query).unwrap_or(Event::Closed),
          _ = (&mut sweep).fuse() => Event::Sweep,
        };

        match event {
          Event::Add(entry) => self.add(entry),
          Event::Query(req) => self.answer(req).await,
          Event::Subscribe(sub) => self.subscriptions.push(sub),
          Event::Sweep => {
            self.sweep(now_nanos());
            continue 'running;
          }
          Event::Closed => break 'running,
        }
      }
    }

    tracing::debug!("mdns zone: mainloop stopped");
  }

  fn add(&mut self, entry: Entry) {
    let duplicate = self
      .entries
      .get(entry.fqdn())
      .is_some_and(|bucket| {
        bucket
          .iter()
          .any(|present| present.record().matches_identity(entry.record()))
      });
    if duplicate {
      tracing::trace!(name = %entry.fqdn(), "mdns zone: ignoring duplicate entry");
      return;
    }

    tracing::debug!(name = %entry.fqdn(), ty = %entry.record().ty(), publish = entry.publish(), "mdns zone: adding entry");
    self.notify(&entry);
    self.entries.entry(entry.fqdn().clone()).or_default().push(entry);
  }

  async fn answer(&self, req: QueryRequest) {
    // dropping `req.result` on return is what closes the channel
    let Some(bucket) = self.entries.get(req.question.name()) else {
      return;
    };

    for entry in bucket {
      if !req.question.matches_type(entry.record().ty()) {
        continue;
      }
      if req.result.send(entry.clone()).await.is_err() {
        // the querier went away mid-drain
        return;
      }
    }
  }

  fn notify(&mut self, entry: &Entry) {
    self.subscriptions.retain(|sub| {
      if !sub.question.matches_type(entry.record().ty()) {
        return true;
      }
      match sub.result.try_send(entry.clone()) {
        Ok(()) => true,
        // a stuck subscriber loses this notification, never the zone
        Err(TrySendError::Full(_)) => {
          tracing::trace!(name = %entry.fqdn(), "mdns zone: subscriber full, dropping notification");
          true
        }
        Err(TrySendError::Closed(_)) => false,
      }
    });
  }

  fn sweep(&mut self, now: u64) {
    self.entries.retain(|_, bucket| {
      bucket.retain(|entry| !entry.is_expired(now));
      !bucket.is_empty()
    });
  }
}
