use core::net::{Ipv4Addr, SocketAddr};
use std::{collections::HashSet, io};

use agnostic_net::{
  Net, UdpSocket,
  runtime::{AsyncSpawner, RuntimeLite},
};
use async_channel::{Receiver, Sender};
use atomic_refcell::AtomicRefCell;
use either::Either;
use futures::{FutureExt, StreamExt as _, stream::FuturesUnordered};
use iprobe::{ipv4, ipv6};
use smallvec_wrapper::{MediumVec, OneOrMore, TinyVec};
use triomphe::Arc;

use super::{
  IPV4_MDNS, IPV6_MDNS, MAX_PAYLOAD_SIZE, MDNS_PORT,
  types::{
    Message, Name, OP_CODE_QUERY, ProtoError, Question, RESPONSE_CODE_NO_ERROR, Record,
    RecordData, RecordType, Response,
  },
  utils::{multicast_udp4_socket, multicast_udp6_socket},
  zone::{Entry, Zone},
};

/// Capacity of the decoded-packet channel between a worker's reader and
/// its handler. Once full, the reader blocks and the kernel receive
/// buffer absorbs (and eventually drops) excess datagrams.
const INBOUND_BUFFER: usize = 32;

/// The options for [`Server`].
#[derive(Clone, Debug)]
pub struct ServerOptions {
  ipv4_interface: Option<Ipv4Addr>,
  ipv6_interface: Option<u32>,
  log_empty_responses: bool,
}

impl Default for ServerOptions {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl ServerOptions {
  /// Returns a new instance of [`ServerOptions`].
  #[inline]
  pub const fn new() -> Self {
    Self {
      ipv4_interface: None,
      ipv6_interface: None,
      log_empty_responses: false,
    }
  }

  /// Returns the Ipv4 interface to bind the multicast listener to.
  ///
  /// ## Example
  ///
  /// ```rust
  /// use mdns_zone::ServerOptions;
  /// use std::net::Ipv4Addr;
  ///
  /// let opts = ServerOptions::new().with_ipv4_interface(Ipv4Addr::new(192, 168, 1, 1));
  /// assert_eq!(opts.ipv4_interface(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
  /// ```
  #[inline]
  pub const fn ipv4_interface(&self) -> Option<&Ipv4Addr> {
    self.ipv4_interface.as_ref()
  }

  /// Sets the IPv4 interface to bind the multicast listener to.
  #[inline]
  pub fn with_ipv4_interface(mut self, iface: Ipv4Addr) -> Self {
    self.ipv4_interface = Some(iface);
    self
  }

  /// Returns the Ipv6 interface to bind the multicast listener to.
  ///
  /// ## Example
  ///
  /// ```rust
  /// use mdns_zone::ServerOptions;
  ///
  /// let opts = ServerOptions::new().with_ipv6_interface(1);
  /// assert_eq!(opts.ipv6_interface(), Some(1));
  /// ```
  #[inline]
  pub const fn ipv6_interface(&self) -> Option<u32> {
    self.ipv6_interface
  }

  /// Sets the IPv6 interface to bind the multicast listener to.
  #[inline]
  pub fn with_ipv6_interface(mut self, index: u32) -> Self {
    self.ipv6_interface = Some(index);
    self
  }

  /// Sets whether the server should print an informative message
  /// when there is an mDNS query for which the server has no response.
  ///
  /// Default is `false`.
  #[inline]
  pub fn with_log_empty_responses(mut self, log_empty_responses: bool) -> Self {
    self.log_empty_responses = log_empty_responses;
    self
  }

  /// Returns whether the server should print an informative message
  /// when there is an mDNS query for which the server has no response.
  #[inline]
  pub const fn log_empty_responses(&self) -> bool {
    self.log_empty_responses
  }
}

/// The multicast responders of a [`Zone`].
///
/// A server drives one socket worker per available address family. Each
/// worker answers multicast questions out of the zone and feeds records
/// observed in peer responses back into it.
pub struct Server<N: Net> {
  zone: Zone<N::Runtime>,
  opts: ServerOptions,
  handles: AtomicRefCell<
    FuturesUnordered<<<N::Runtime as RuntimeLite>::Spawner as AsyncSpawner>::JoinHandle<()>>,
  >,
  shutdown_tx: Sender<()>,
}

impl<N: Net> Drop for Server<N> {
  fn drop(&mut self) {
    self.shutdown_tx.close();
  }
}

impl<N: Net> Server<N> {
  /// Binds the multicast sockets and starts the workers.
  ///
  /// Must be called from within the runtime. Binding one address family
  /// may fail (logged) as long as the other comes up; failing both is an
  /// error.
  pub fn new(zone: Zone<N::Runtime>, opts: ServerOptions) -> io::Result<Self> {
    let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);
    let handles = FuturesUnordered::new();

    let v4 = if ipv4() {
      match multicast_udp4_socket(opts.ipv4_interface, MDNS_PORT)
        .and_then(<N::UdpSocket as TryFrom<_>>::try_from)
      {
        Ok(conn) => Some(Worker::<N>::new(
          conn,
          (IPV4_MDNS, MDNS_PORT).into(),
          zone.clone(),
          opts.log_empty_responses,
          shutdown_rx.clone(),
        )?),
        Err(e) => {
          tracing::error!(err=%e, "mdns server: failed to bind to IPv4");
          None
        }
      }
    } else {
      None
    };

    let v6 = if ipv6() {
      match multicast_udp6_socket(opts.ipv6_interface, MDNS_PORT)
        .and_then(<N::UdpSocket as TryFrom<_>>::try_from)
      {
        Ok(conn) => Some(Worker::<N>::new(
          conn,
          (IPV6_MDNS, MDNS_PORT).into(),
          zone.clone(),
          opts.log_empty_responses,
          shutdown_rx.clone(),
        )?),
        Err(e) => {
          tracing::error!(err=%e, "mdns server: failed to bind to IPv6");
          None
        }
      }
    } else {
      None
    };

    match (v4, v6) {
      (Some(v4), Some(v6)) => {
        v4.spawn(&handles);
        v6.spawn(&handles);
      }
      (Some(v4), None) => v4.spawn(&handles),
      (None, Some(v6)) => v6.spawn(&handles),
      (None, None) => {
        return Err(io::Error::new(
          io::ErrorKind::InvalidInput,
          "no multicast listeners could be started",
        ));
      }
    }

    Ok(Self {
      zone,
      opts,
      handles: AtomicRefCell::new(handles),
      shutdown_tx,
    })
  }

  /// Returns the zone the server answers from.
  #[inline]
  pub fn zone(&self) -> &Zone<N::Runtime> {
    &self.zone
  }

  /// Returns the options of the server.
  #[inline]
  pub fn options(&self) -> &ServerOptions {
    &self.opts
  }

  /// Shuts down the workers.
  ///
  /// This method is concurrent safe and can be called multiple times, but only the first call
  /// will have an effect.
  pub async fn shutdown(&self) {
    if !self.shutdown_tx.close() {
      return;
    }

    let mut handles = core::mem::take(&mut *self.handles.borrow_mut());
    while handles.next().await.is_some() {}
  }
}

/// One multicast socket plus the two tasks driving it: a reader that
/// decodes datagrams onto a bounded channel and a handler that talks to
/// the zone and writes responses back to the group.
struct Worker<N: Net> {
  conn: Arc<N::UdpSocket>,
  group: SocketAddr,
  local_addr: SocketAddr,
  zone: Zone<N::Runtime>,
  /// Indicates the server should print an informative message
  /// when there is an mDNS query for which the server has no response.
  log_empty_responses: bool,
  shutdown_rx: Receiver<()>,
}

impl<N: Net> Worker<N> {
  fn new(
    conn: N::UdpSocket,
    group: SocketAddr,
    zone: Zone<N::Runtime>,
    log_empty_responses: bool,
    shutdown_rx: Receiver<()>,
  ) -> io::Result<Self> {
    conn.local_addr().map(|local_addr| Self {
      conn: Arc::new(conn),
      group,
      local_addr,
      zone,
      log_empty_responses,
      shutdown_rx,
    })
  }

  fn spawn(
    self,
    handles: &FuturesUnordered<
      <<N::Runtime as RuntimeLite>::Spawner as AsyncSpawner>::JoinHandle<()>,
    >,
  ) {
    let (msg_tx, msg_rx) = async_channel::bounded(INBOUND_BUFFER);

    tracing::info!(local=%self.local_addr, group=%self.group, "mdns server: listening for mDNS packets");
    handles.push(<N::Runtime as RuntimeLite>::Spawner::spawn(
      Self::read_packets(
        self.conn.clone(),
        self.local_addr,
        msg_tx,
        self.shutdown_rx.clone(),
      ),
    ));
    handles.push(<N::Runtime as RuntimeLite>::Spawner::spawn(
      self.handle_packets(msg_rx),
    ));
  }

  async fn read_packets(
    conn: Arc<N::UdpSocket>,
    local_addr: SocketAddr,
    msg_tx: Sender<(Message, SocketAddr)>,
    shutdown_rx: Receiver<()>,
  ) {
    let mut buf = vec![0; MAX_PAYLOAD_SIZE];

    loop {
      futures::select! {
        _ = shutdown_rx.recv().fuse() => {
          tracing::info!(local=%local_addr, "mdns server: shutting down packet reader");
          return;
        }
        res = conn.recv_from(&mut buf).fuse() => match res {
          Ok((len, from)) => {
            if len == 0 {
              continue;
            }

            let data = &buf[..len];
            tracing::trace!(from=%from, len, "mdns server: received packet");
            let msg = match Message::decode(data) {
              Ok(msg) => msg,
              Err(e) => {
                tracing::error!(from=%from, err=%e, "mdns server: failed to deserialize packet");
                continue;
              }
            };

            // Blocks once the handler falls INBOUND_BUFFER messages
            // behind; the kernel receive buffer absorbs the overflow.
            futures::select! {
              res = msg_tx.send((msg, from)).fuse() => if res.is_err() {
                return;
              },
              _ = shutdown_rx.recv().fuse() => return,
            }
          }
          Err(_err) => {
            #[cfg(target_os = "linux")]
            tracing::error!(err=%_err, local=%local_addr, "mdns server: failed to receive data from UDP socket");
            <N::Runtime as RuntimeLite>::yield_now().await;
          }
        }
      }
    }
  }

  async fn handle_packets(self, msg_rx: Receiver<(Message, SocketAddr)>) {
    loop {
      futures::select! {
        _ = self.shutdown_rx.recv().fuse() => {
          tracing::info!(local=%self.local_addr, "mdns server: shutting down packet handler");
          return;
        }
        incoming = msg_rx.recv().fuse() => {
          let Ok((msg, from)) = incoming else { return };
          if msg.is_question() {
            self.handle_question(from, msg).await;
          } else {
            ingest_answers(&self.zone, msg, from).await;
          }
        }
      }
    }
  }

  async fn handle_question(&self, from: SocketAddr, msg: Message) {
    if msg.header.opcode != OP_CODE_QUERY {
      // "In both multicast query and multicast response messages, the OPCODE MUST
      // be zero on transmission (only standard queries are currently supported
      // over multicast).  Multicast DNS messages received with an OPCODE other
      // than zero MUST be silently ignored."  Note: OpcodeQuery == 0
      tracing::error!(from=%from, opcode = %msg.header.opcode, "mdns server: received query with non-zero OpCode");
      return;
    }

    if msg.header.response_code != RESPONSE_CODE_NO_ERROR {
      // "In both multicast query and multicast response messages, the Response
      // Code MUST be zero on transmission.  Multicast DNS messages received with
      // non-zero Response Codes MUST be silently ignored."
      tracing::error!(from=%from, rcode = %msg.header.response_code, "mdns server: received query with non-zero response_code");
      return;
    }

    // TODO: handle the "TC (Truncated) Bit":
    //    In query messages, if the TC bit is set, it means that additional
    //    Known-Answer records may be following shortly.  A responder SHOULD
    //    record this fact, and wait for those additional Known-Answer records,
    //    before deciding whether to respond.
    if msg.header.truncated {
      tracing::error!(
        "mdns server: support for DNS requests with high truncated bit not implemented"
      );
      return;
    }

    let answers = assemble_answers(&self.zone, msg.questions()).await;
    if answers.is_empty() {
      if self.log_empty_responses {
        let mut questions = MediumVec::with_capacity(msg.questions().len());
        for question in msg.questions() {
          questions.push(question.name().as_str());
        }

        tracing::info!(
          "mdns server: no responses for query with questions: {}",
          questions.join(", ")
        );
      }
      return;
    }

    let additionals = find_additionals(&self.zone, &answers).await;

    // 18.1: ID (Query Identifier) - 0 for multicast responses
    let resp = Response::new(0, msg.into_questions(), answers, additionals);
    if let Err(e) = self.respond(resp).await {
      tracing::error!(to=%self.group, err=%e, "mdns server: failed to send response");
    }
  }

  async fn respond(&self, resp: Response) -> Result<usize, Either<ProtoError, io::Error>> {
    let data = resp.encode().map_err(Either::Left)?;
    tracing::trace!(to=%self.group, len=data.len(), "mdns server: sending response");
    self
      .conn
      .send_to(&data, self.group)
      .await
      .map_err(Either::Right)
  }
}

/// Collects the publishable entries matching `questions`, in question
/// then insertion order. This is the Answer section of a response.
pub(crate) async fn assemble_answers<R: RuntimeLite>(
  zone: &Zone<R>,
  questions: &[Question],
) -> OneOrMore<Record> {
  let mut answers = OneOrMore::new();
  for question in questions {
    let results = zone.query(question.clone()).await;
    while let Ok(entry) = results.recv().await {
      if entry.publish() {
        answers.push(entry.into_record());
      }
    }
  }
  answers
}

/// Recursively resolves the Additional section for a set of answers:
/// a PTR pulls in everything its target owns, an SRV pulls in the
/// address records of its target, and every record found is expanded in
/// turn.
///
/// The visited set is keyed by (owner name, type, rdata) and pre-seeded
/// with the answers themselves, so PTR/SRV cycles terminate and nothing
/// is reported twice.
pub(crate) async fn find_additionals<R: RuntimeLite>(
  zone: &Zone<R>,
  answers: &[Record],
) -> OneOrMore<Record> {
  let mut additionals = OneOrMore::new();
  let mut visited: HashSet<(Name, RecordType, RecordData)> = HashSet::new();
  let mut pending: Vec<Question> = Vec::new();

  for record in answers {
    visited.insert(visit_key(record));
    pending.extend(follow_up(record));
  }

  while let Some(question) = pending.pop() {
    let results = zone.query(question).await;
    while let Ok(entry) = results.recv().await {
      if !entry.publish() {
        continue;
      }
      let record = entry.into_record();
      if !visited.insert(visit_key(&record)) {
        continue;
      }
      pending.extend(follow_up(&record));
      additionals.push(record);
    }
  }

  additionals
}

/// Feeds every answer record of a peer response into the zone as an
/// observed entry.
pub(crate) async fn ingest_answers<R: RuntimeLite>(
  zone: &Zone<R>,
  msg: Message,
  from: SocketAddr,
) {
  for record in msg.into_answers() {
    tracing::trace!(from=%from, name=%record.name(), ty=%record.ty(), "mdns server: observed record");
    zone.add(Entry::observed(record, from)).await;
  }
}

/// The follow-up questions a record contributes to the Additional walk.
fn follow_up(record: &Record) -> TinyVec<Question> {
  match record.data() {
    RecordData::PTR(target) => TinyVec::from_iter([Question::any(target.clone())]),
    RecordData::SRV(srv) => TinyVec::from_iter([
      Question::new(srv.target().clone(), RecordType::A),
      Question::new(srv.target().clone(), RecordType::AAAA),
    ]),
    _ => TinyVec::new(),
  }
}

fn visit_key(record: &Record) -> (Name, RecordType, RecordData) {
  (record.name().clone(), record.ty(), record.data().clone())
}
