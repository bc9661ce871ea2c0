//! The mDNS controller.
//!
//! [`Zeroconf`] owns the record cache, the registered services and the record
//! listeners, and coordinates the threads that feed them:
//!
//! - the socket engine reads packets and hands them to [`Zeroconf::handle_packet`]
//! - the reaper evicts expired records every [`reap_interval`](crate::MdnsConfig::reap_interval)
//! - every [`ServiceBrowser`] runs its own query loop
//!
//! All shared state sits behind one mutex paired with one condition
//! variable. Every mutation is followed by [`Zeroconf::notify_all`], which is
//! what browsers and resolvers wait on. Listeners are always called with the
//! state lock released.
//!
//! # Example
//!
//! ```rust,ignore
//! use astv_mdns::{MdnsConfig, ServiceInfo, Zeroconf};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let zc = Zeroconf::new(MdnsConfig::default())?;
//! let mut info = ServiceInfo::new("_http._tcp.local.", "Web._http._tcp.local.")?
//!     .with_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)))
//!     .with_port(8080);
//! zc.register_service(&mut info, 3600, true)?;
//! // ...
//! zc.close()?;
//! ```

mod listener;


use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use shared::error::{Error, Result};
use shared::ifaces;
use shared::time::current_time_millis;

use crate::browser::{ServiceBrowser, ServiceEvent};
use crate::cache::DnsCache;
use crate::config::{InterfaceChoice, MdnsConfig};
use crate::engine::Engine;
use crate::message::*;
use crate::naming::service_type_name;
use crate::reaper::Reaper;
use crate::service_info::ServiceInfo;
use crate::socket::MulticastSocket;
use listener::PacketListener;

/// The mDNS multicast group address (224.0.0.251).
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The standard mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// mDNS multicast destination address (224.0.0.251:5353).
///
/// ```rust
/// use astv_mdns::MDNS_DEST_ADDR;
///
/// assert_eq!(MDNS_DEST_ADDR.to_string(), "224.0.0.251:5353");
/// ```
pub const MDNS_DEST_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(MDNS_MULTICAST_IPV4), MDNS_PORT);

/// Name queried to enumerate the service types on a network.
pub const SERVICE_TYPE_ENUMERATION: &str = "_services._dns-sd._udp.local.";

/// Identifies a browser started with [`Zeroconf::add_service_listener`].
pub type BrowserId = u64;

/// Receives every record the controller learns or expires.
///
/// Called on the engine, reaper or registering thread with no controller
/// lock held; implementations may call back into the [`Zeroconf`].
pub trait RecordListener: Send + Sync {
    fn update_record(&self, zc: &Zeroconf, now: u64, record: &DnsRecord);
}

struct Registration {
    info: ServiceInfo,
    ttl: u32,
}

#[derive(Default)]
struct ZeroconfState {
    cache: DnsCache,
    listeners: Vec<Arc<dyn RecordListener>>,
    services: HashMap<String, Registration>,
    // lowercased type -> (type as registered, instance count)
    service_types: HashMap<String, (String, usize)>,
}

pub(crate) struct ZeroconfInner {
    config: MdnsConfig,
    state: Mutex<ZeroconfState>,
    condition: Condvar,
    done: Arc<AtomicBool>,
    closed: AtomicBool,
    engine: Engine,
    listen_key: Mutex<Option<usize>>,
    respond_sockets: Mutex<Vec<UdpSocket>>,
    reaper: Mutex<Option<Reaper>>,
    browsers: Mutex<HashMap<BrowserId, ServiceBrowser>>,
    next_browser_id: AtomicU64,
    sent_packets: AtomicU64,
}

impl Drop for ZeroconfInner {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.engine.stop();
    }
}

/// Handle to an mDNS responder and browser.
///
/// Cloning is cheap; all clones share the same state. Call
/// [`close`](Zeroconf::close) to send goodbyes and stop the background
/// threads.
#[derive(Clone)]
pub struct Zeroconf {
    pub(crate) inner: Arc<ZeroconfInner>,
}

impl Zeroconf {
    /// Starts an instance: opens the sockets (unless disabled), the socket
    /// engine and the reaper.
    pub fn new(config: MdnsConfig) -> Result<Self> {
        let done = Arc::new(AtomicBool::new(false));

        let (listen, respond) = if config.bind_sockets {
            open_sockets(config.interface)?
        } else {
            (None, vec![])
        };

        let engine = Engine::new(
            Arc::clone(&done),
            config.engine_idle_wait,
            config.engine_poll_timeout,
        )?;
        let reap_interval = config.reap_interval;

        let zc = Zeroconf {
            inner: Arc::new(ZeroconfInner {
                config,
                state: Mutex::new(ZeroconfState::default()),
                condition: Condvar::new(),
                done,
                closed: AtomicBool::new(false),
                engine,
                listen_key: Mutex::new(None),
                respond_sockets: Mutex::new(respond),
                reaper: Mutex::new(None),
                browsers: Mutex::new(HashMap::new()),
                next_browser_id: AtomicU64::new(1),
                sent_packets: AtomicU64::new(0),
            }),
        };

        if let Some(listen) = listen {
            let reader = Arc::new(PacketListener::new(Arc::downgrade(&zc.inner)));
            let key = zc.inner.engine.add_reader(reader, Arc::new(listen))?;
            *zc.inner.listen_key.lock()? = Some(key);
        }

        let reaper = Reaper::spawn(Arc::downgrade(&zc.inner), reap_interval)?;
        *zc.inner.reaper.lock()? = Some(reaper);

        log::debug!("mdns: started");
        Ok(zc)
    }

    pub fn config(&self) -> &MdnsConfig {
        &self.inner.config
    }

    /// Set once [`close`](Zeroconf::close) starts.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Number of packets handed to the sockets (or dropped, when offline).
    pub fn sent_packet_count(&self) -> u64 {
        self.inner.sent_packets.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ZeroconfState>> {
        Ok(self.inner.state.lock()?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_done() {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Blocks until notified or until `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let state = self.lock_state()?;
        let _ = self.inner.condition.wait_timeout(state, timeout)?;
        Ok(())
    }

    /// Like [`wait`](Zeroconf::wait), but returns at once when `ready` holds.
    ///
    /// `ready` is evaluated under the state lock, so a notification sent
    /// after it returned `false` is never missed.
    pub fn wait_unless(&self, timeout: Duration, ready: impl FnOnce() -> bool) -> Result<()> {
        let state = self.lock_state()?;
        if ready() {
            return Ok(());
        }
        let _ = self.inner.condition.wait_timeout(state, timeout)?;
        Ok(())
    }

    /// Wakes every thread blocked in [`wait`](Zeroconf::wait).
    pub fn notify_all(&self) -> Result<()> {
        let _state = self.lock_state()?;
        self.inner.condition.notify_all();
        Ok(())
    }

    // Waits until `deadline`. Returns false when interrupted by close, unless
    // `through_close` is set.
    pub(crate) fn wait_until(&self, deadline: Instant, through_close: bool) -> Result<bool> {
        loop {
            if !through_close && self.is_done() {
                return Ok(false);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(true);
            }
            self.wait(deadline - now)?;
        }
    }

    /// Runs `f` against the cache under the state lock.
    pub fn with_cache<R>(&self, f: impl FnOnce(&DnsCache) -> R) -> Result<R> {
        let state = self.lock_state()?;
        Ok(f(&state.cache))
    }

    /// A cached record, copied out of the cache.
    pub fn cached_record(&self, name: &str, typ: DnsType, class: DnsClass) -> Result<Option<DnsRecord>> {
        self.with_cache(|cache| cache.get_by_details(name, typ, class).cloned())
    }

    pub fn cache_snapshot(&self) -> Result<Vec<DnsRecord>> {
        self.with_cache(DnsCache::entries)
    }

    /// Registers `listener`, then replays the live cached records answering
    /// `question` to it.
    pub fn add_listener(
        &self,
        listener: Arc<dyn RecordListener>,
        question: Option<&DnsQuestion>,
    ) -> Result<()> {
        let now = current_time_millis();
        let replay: Vec<DnsRecord> = {
            let mut state = self.lock_state()?;
            state.listeners.push(Arc::clone(&listener));
            match question {
                Some(question) => state
                    .cache
                    .entries_with_name(question.name())
                    .iter()
                    .filter(|r| question.answered_by(r) && !r.is_expired(now))
                    .cloned()
                    .collect(),
                None => vec![],
            }
        };
        for record in &replay {
            listener.update_record(self, now, record);
        }
        self.notify_all()
    }

    pub fn remove_listener(&self, listener: &Arc<dyn RecordListener>) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            state.listeners.retain(|l| !same_listener(l, listener));
        }
        self.notify_all()
    }

    /// Passes a record to every listener, then wakes waiters.
    pub fn update_record(&self, now: u64, record: &DnsRecord) -> Result<()> {
        self.update_records(now, std::slice::from_ref(record))
    }

    fn update_records(&self, now: u64, records: &[DnsRecord]) -> Result<()> {
        let listeners = self.lock_state()?.listeners.clone();
        for record in records {
            for listener in &listeners {
                listener.update_record(self, now, record);
            }
        }
        self.notify_all()
    }

    /// Evicts every expired record, telling listeners about each one first.
    pub fn reap_expired(&self, now: u64) -> Result<usize> {
        let mut reaped = 0;
        for record in self.cache_snapshot()? {
            if record.is_expired(now) {
                self.update_record(now, &record)?;
                self.lock_state()?.cache.remove(&record);
                reaped += 1;
            }
        }
        if reaped > 0 {
            log::trace!("mdns: reaped {reaped} expired records");
        }
        Ok(reaped)
    }

    /// Parses a received packet and dispatches it. Malformed packets are
    /// logged and dropped.
    pub fn handle_packet(&self, data: &[u8], from: SocketAddr) -> Result<()> {
        let msg = match DnsIncoming::parse(data) {
            Ok(msg) => msg,
            Err(err) => {
                log::debug!("mdns: discarding malformed packet from {from}: {err}");
                return Ok(());
            }
        };
        log::trace!("mdns: {msg} from {from}");

        if msg.is_query() {
            if from.port() == MDNS_PORT {
                self.handle_query(&msg, MDNS_DEST_ADDR)
            } else {
                // legacy unicast querier, answer it directly and the group
                self.handle_query(&msg, from)?;
                self.handle_query(&msg, MDNS_DEST_ADDR)
            }
        } else {
            self.handle_response(&msg)
        }
    }

    /// Merges the records of a response into the cache, then notifies
    /// listeners of each of them.
    pub fn handle_response(&self, msg: &DnsIncoming) -> Result<()> {
        let now = current_time_millis();
        {
            let mut state = self.lock_state()?;
            for record in &msg.answers {
                let expired = record.is_expired(now);
                if expired {
                    state.cache.remove(record);
                } else if let Some(existing) = state.cache.get_matching_mut(record) {
                    existing.reset_ttl(record);
                } else {
                    state.cache.add(record.clone());
                }
            }
        }
        self.update_records(now, &msg.answers)
    }

    /// Answers the questions of `msg` about our registered services.
    ///
    /// `addr` is where the answer goes: a querier not on the mDNS port gets
    /// a unicast reply that echoes its id and questions.
    pub fn handle_query(&self, msg: &DnsIncoming, addr: SocketAddr) -> Result<()> {
        let flags = FLAGS_QR_RESPONSE | FLAGS_AA;
        let mut out = if addr.port() != MDNS_PORT {
            DnsOutgoing::reply_to(flags, msg)
        } else {
            DnsOutgoing::new(flags)
        };
        let default_ttl = self.inner.config.default_ttl;

        {
            let state = self.lock_state()?;
            for question in &msg.questions {
                match question.typ() {
                    DnsType::Ptr => {
                        if question.key() == SERVICE_TYPE_ENUMERATION {
                            for (type_, _) in state.service_types.values() {
                                out.add_answer(
                                    msg,
                                    DnsRecord::pointer(
                                        SERVICE_TYPE_ENUMERATION,
                                        DnsType::Ptr,
                                        DNSCLASS_INET.0,
                                        default_ttl,
                                        type_,
                                    ),
                                );
                            }
                        }
                        for reg in state.services.values() {
                            if question.key() == reg.info.type_().to_lowercase() {
                                out.add_answer(msg, reg.info.ptr_record(reg.ttl));
                            }
                        }
                    }
                    typ => {
                        if matches!(typ, DnsType::A | DnsType::Aaaa | DnsType::Any) {
                            for reg in state.services.values() {
                                if reg.info.server_name().to_lowercase() == question.key() {
                                    if let Some(record) = reg.info.address_record(reg.ttl) {
                                        if typ == DnsType::Any || typ == record.typ() {
                                            out.add_answer(msg, record);
                                        }
                                    }
                                }
                            }
                        }

                        if let Some(reg) = state.services.get(question.key()) {
                            if matches!(typ, DnsType::Srv | DnsType::Any) {
                                out.add_answer(msg, reg.info.srv_record(reg.ttl));
                            }
                            if matches!(typ, DnsType::Txt | DnsType::Any) {
                                out.add_answer(msg, reg.info.txt_record(reg.ttl));
                            }
                            if typ == DnsType::Srv {
                                if let Some(record) = reg.info.address_record(reg.ttl) {
                                    out.add_additional_answer(record);
                                }
                            }
                        }
                    }
                }
            }
        }

        if !out.answers.is_empty() {
            self.send(&out, addr);
        }
        Ok(())
    }

    /// Serializes and transmits `out` on every responder socket.
    ///
    /// Packets that cannot be encoded or exceed [`MAX_MSG_ABSOLUTE`] are
    /// logged and dropped.
    pub fn send(&self, out: &DnsOutgoing, addr: SocketAddr) {
        let packet = match out.packet() {
            Ok(packet) => packet,
            Err(err) => {
                log::warn!("mdns: dropping unencodable {out}: {err}");
                return;
            }
        };
        if packet.len() > MAX_MSG_ABSOLUTE {
            log::warn!("mdns: dropping {} byte packet: {}", packet.len(), Error::ErrPacketTooBig);
            return;
        }
        self.inner.sent_packets.fetch_add(1, Ordering::SeqCst);

        let sockets = match self.inner.respond_sockets.lock() {
            Ok(sockets) => sockets,
            Err(err) => {
                log::error!("mdns: responder sockets unavailable: {err}");
                return;
            }
        };
        for socket in sockets.iter() {
            if let Err(err) = socket.send_to(&packet, addr) {
                log::debug!("mdns: send to {addr} failed: {err}");
            }
        }
    }

    /// Probes for `info`, then announces it three times.
    ///
    /// When another host already owns the name, the instance is renamed to
    /// `<instance>-2`, `<instance>-3`, ... if `allow_name_change` is set;
    /// otherwise [`Error::ErrNonUniqueName`] is returned. `info` holds the
    /// final name on return.
    pub fn register_service(
        &self,
        info: &mut ServiceInfo,
        ttl: u32,
        allow_name_change: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        self.check_service(info, allow_name_change)?;

        {
            let mut state = self.lock_state()?;
            let type_key = info.type_().to_lowercase();
            state
                .service_types
                .entry(type_key)
                .or_insert_with(|| (info.type_().to_owned(), 0))
                .1 += 1;
            state.services.insert(
                info.key(),
                Registration {
                    info: info.clone(),
                    ttl,
                },
            );
        }
        log::info!("mdns: registering {} on port {}", info.name(), info.port());

        let mut next = Instant::now();
        for _ in 0..3 {
            if !self.wait_until(next, false)? {
                return Err(Error::ErrConnectionClosed);
            }
            self.send(&announcement(info, ttl), MDNS_DEST_ADDR);
            next += self.inner.config.register_interval;
        }
        Ok(())
    }

    /// Sends goodbyes for a registered service and forgets it.
    pub fn unregister_service(&self, info: &ServiceInfo) -> Result<()> {
        let removed = {
            let mut state = self.lock_state()?;
            let removed = state.services.remove(&info.key());
            if let Some(reg) = &removed {
                forget_type(&mut state, reg.info.type_());
            }
            removed
        };
        let Some(reg) = removed else {
            return Err(Error::ErrServiceNotRegistered);
        };
        log::info!("mdns: unregistering {}", reg.info.name());
        self.send_goodbyes(&[reg.info])
    }

    pub fn unregister_all_services(&self) -> Result<()> {
        let infos: Vec<ServiceInfo> = {
            let mut state = self.lock_state()?;
            state.service_types.clear();
            state.services.drain().map(|(_, reg)| reg.info).collect()
        };
        self.send_goodbyes(&infos)
    }

    pub fn registered_services(&self) -> Result<Vec<ServiceInfo>> {
        Ok(self
            .lock_state()?
            .services
            .values()
            .map(|reg| reg.info.clone())
            .collect())
    }

    fn send_goodbyes(&self, infos: &[ServiceInfo]) -> Result<()> {
        if infos.is_empty() {
            return Ok(());
        }
        let mut next = Instant::now();
        for _ in 0..3 {
            self.wait_until(next, true)?;
            let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
            for info in infos {
                for record in info.records(0) {
                    out.add_answer_at_time(record, None);
                }
            }
            self.send(&out, MDNS_DEST_ADDR);
            next += self.inner.config.unregister_interval;
        }
        Ok(())
    }

    // Probes three times for the instance name, renaming on conflicts.
    fn check_service(&self, info: &mut ServiceInfo, allow_name_change: bool) -> Result<()> {
        service_type_name(info.type_())?;
        let instance = info.instance_name().to_owned();
        let mut next_instance_number = 2;

        let mut next = Instant::now();
        let mut i = 0;
        while i < 3 {
            let now_ms = current_time_millis();
            let conflict = self.with_cache(|cache| {
                cache
                    .current_entry_with_name_and_alias(info.type_(), info.name(), now_ms)
                    .is_some()
            })?;
            if conflict {
                if !allow_name_change {
                    return Err(Error::ErrNonUniqueName);
                }
                let name = format!("{instance}-{next_instance_number}.{}", info.type_());
                service_type_name(&name)?;
                log::info!("mdns: {} is taken, trying {name}", info.name());
                info.set_name(name);
                next_instance_number += 1;
                next = Instant::now();
                i = 0;
                continue;
            }

            let now = Instant::now();
            if now < next {
                self.ensure_open()?;
                self.wait(next - now)?;
                continue;
            }

            let mut out = DnsOutgoing::new(FLAGS_QR_QUERY | FLAGS_AA);
            out.add_question(DnsQuestion::new(info.type_(), DnsType::Ptr, DNSCLASS_INET));
            out.add_authoritative_answer(info.ptr_record(self.inner.config.default_ttl));
            self.send(&out, MDNS_DEST_ADDR);

            i += 1;
            next += self.inner.config.check_interval;
        }
        Ok(())
    }

    /// Resolves one service instance, waiting at most `timeout`.
    pub fn get_service_info(
        &self,
        type_: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<ServiceInfo>> {
        let mut info = ServiceInfo::new(type_, name)?;
        if info.request(self, timeout)? {
            Ok(Some(info))
        } else {
            Ok(None)
        }
    }

    /// Starts a browser for `type_` owned by this instance.
    pub fn add_service_listener<F>(&self, type_: &str, handler: F) -> Result<BrowserId>
    where
        F: Fn(&Zeroconf, &ServiceEvent) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let browser = ServiceBrowser::new(self, type_, vec![Box::new(handler)])?;
        let id = self.inner.next_browser_id.fetch_add(1, Ordering::SeqCst);
        self.inner.browsers.lock()?.insert(id, browser);
        Ok(id)
    }

    pub fn remove_service_listener(&self, id: BrowserId) -> Result<()> {
        let browser = self.inner.browsers.lock()?.remove(&id);
        match browser {
            Some(mut browser) => browser.cancel(),
            None => Ok(()),
        }
    }

    pub fn remove_all_service_listeners(&self) -> Result<()> {
        let browsers: Vec<ServiceBrowser> = self
            .inner
            .browsers
            .lock()?
            .drain()
            .map(|(_, browser)| browser)
            .collect();
        for mut browser in browsers {
            browser.cancel()?;
        }
        Ok(())
    }

    /// Shuts the instance down: stops browsers, sends goodbyes for every
    /// registered service, stops the engine and the reaper and closes the
    /// sockets. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!("mdns: closing");
        self.inner.done.store(true, Ordering::SeqCst);
        self.notify_all()?;

        self.remove_all_service_listeners()?;
        self.unregister_all_services()?;
        self.lock_state()?.listeners.clear();

        let listen_key = self.inner.listen_key.lock()?.take();
        if let Some(key) = listen_key {
            self.inner.engine.delete_reader(key)?;
        }
        self.notify_all()?;
        self.inner.engine.join()?;

        let reaper = self.inner.reaper.lock()?.take();
        if let Some(mut reaper) = reaper {
            reaper.join()?;
        }

        self.inner.respond_sockets.lock()?.clear();
        Ok(())
    }
}

fn same_listener(a: &Arc<dyn RecordListener>, b: &Arc<dyn RecordListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn forget_type(state: &mut ZeroconfState, type_: &str) {
    let key = type_.to_lowercase();
    let empty = match state.service_types.get_mut(&key) {
        Some((_, count)) => {
            *count = count.saturating_sub(1);
            *count == 0
        }
        None => false,
    };
    if empty {
        state.service_types.remove(&key);
    }
}

fn announcement(info: &ServiceInfo, ttl: u32) -> DnsOutgoing {
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
    for record in info.records(ttl) {
        out.add_answer_at_time(record, None);
    }
    out
}

fn open_sockets(interface: InterfaceChoice) -> Result<(Option<UdpSocket>, Vec<UdpSocket>)> {
    let listen = MulticastSocket::new().into_std()?;

    let interfaces = match interface {
        InterfaceChoice::Default => vec![Ipv4Addr::UNSPECIFIED],
        InterfaceChoice::All => ifaces::ipv4_interfaces()?
            .into_iter()
            .map(|iface| iface.addr)
            .collect(),
    };

    let mut respond = vec![];
    for iface in interfaces {
        // sending from a socket bound to the group address fails, bind any;
        // only the listen socket is read
        match MulticastSocket::new()
            .with_multicast_local_ipv4(Ipv4Addr::UNSPECIFIED)
            .with_interface(iface)
            .with_join_group(false)
            .into_std()
        {
            Ok(socket) => respond.push(socket),
            Err(err) => log::warn!("mdns: cannot open responder socket on {iface}: {err}"),
        }
    }
    if respond.is_empty() {
        return Err(Error::ErrNoInterface);
    }

    Ok((Some(listen), respond))
}
