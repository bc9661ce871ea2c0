
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shared::error::{Error, Result};
use shared::time::current_time_millis;

use crate::message::*;
use crate::proto::{RecordListener, Zeroconf, MDNS_DEST_ADDR};

// A TXT string carries a one byte length prefix.
const MAX_TXT_ENTRY_LEN: usize = 255;

/// A DNS-SD service instance: what gets registered, and what resolution fills
/// in.
///
/// Two infos are equal when their full names match, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct ServiceInfo {
    type_: String,
    name: String,
    address: Option<IpAddr>,
    port: u16,
    weight: u16,
    priority: u16,
    server: Option<String>,
    properties: BTreeMap<String, String>,
    text: Option<Vec<u8>>,
}

impl ServiceInfo {
    /// `name` is the full instance name and must end with `type_`.
    pub fn new(type_: &str, name: &str) -> Result<Self> {
        if !name.to_lowercase().ends_with(&type_.to_lowercase()) {
            return Err(Error::ErrBadTypeInName(name.to_owned()));
        }
        Ok(Self {
            type_: type_.to_owned(),
            name: name.to_owned(),
            ..Default::default()
        })
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// Host name the SRV record points at. Defaults to the instance name.
    pub fn with_server(mut self, server: &str) -> Self {
        self.server = Some(server.to_owned());
        self
    }

    pub fn with_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set_properties(
            properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Lowercased full name, the cache and registry key.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// The instance label: the name without the trailing `.<type>`.
    pub fn instance_name(&self) -> &str {
        let cut = self.name.len().saturating_sub(self.type_.len() + 1);
        self.name.get(..cut).unwrap_or(&self.name)
    }

    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u16 {
        self.weight
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// The server name, or the instance name when none was set.
    pub fn server_name(&self) -> &str {
        self.server.as_deref().unwrap_or(&self.name)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn text(&self) -> Option<&[u8]> {
        self.text.as_deref()
    }

    /// Resolved means server, address and TXT data are all known.
    pub fn is_resolved(&self) -> bool {
        self.server.is_some() && self.address.is_some() && self.text.is_some()
    }

    /// Replaces the properties and rebuilds the TXT data from them.
    /// Entries that do not fit in a TXT string are dropped.
    pub fn set_properties(&mut self, properties: BTreeMap<String, String>) {
        let mut text = Vec::new();
        let mut kept = BTreeMap::new();
        for (key, value) in properties {
            let entry = format!("{key}={value}");
            if entry.len() > MAX_TXT_ENTRY_LEN {
                log::warn!("service {}: dropping {} byte property {key}", self.name, entry.len());
                continue;
            }
            text.push(entry.len() as u8);
            text.extend_from_slice(entry.as_bytes());
            kept.insert(key, value);
        }
        self.properties = kept;
        self.text = Some(text);
    }

    /// Replaces the TXT data and parses properties out of it.
    ///
    /// The first occurrence of a key wins; a string without `=` is a key with
    /// an empty value.
    pub fn set_text(&mut self, text: &[u8]) {
        let mut properties = BTreeMap::new();
        let mut i = 0;
        while i < text.len() {
            let len = text[i] as usize;
            let end = (i + 1 + len).min(text.len());
            let entry = String::from_utf8_lossy(&text[i + 1..end]);
            i = end;

            let (key, value) = match entry.split_once('=') {
                Some((key, value)) => (key, value),
                None => (entry.as_ref(), ""),
            };
            if key.is_empty() || properties.contains_key(key) {
                continue;
            }
            properties.insert(key.to_owned(), value.to_owned());
        }
        self.properties = properties;
        self.text = Some(text.to_vec());
    }

    /// Applies a record about this service, ignoring expired ones.
    ///
    /// `server_address` is the cached address record of the SRV target, used
    /// when `record` is an SRV.
    pub fn update_record(
        &mut self,
        now: u64,
        record: &DnsRecord,
        server_address: Option<&DnsRecord>,
    ) {
        if record.is_expired(now) {
            return;
        }
        match record.data() {
            RecordData::Address(addr) => {
                if record.key() == self.server_name().to_lowercase() {
                    self.address = Some(*addr);
                }
            }
            RecordData::Service {
                priority,
                weight,
                port,
                server,
            } => {
                if record.key() == self.key() {
                    self.server = Some(server.clone());
                    self.port = *port;
                    self.weight = *weight;
                    self.priority = *priority;
                    if let Some(address) = server_address {
                        self.update_record(now, address, None);
                    }
                }
            }
            RecordData::Text(text) => {
                if record.key() == self.key() {
                    self.set_text(text);
                }
            }
            _ => {}
        }
    }

    /// Fills in the missing fields from the cache, then queries the network
    /// until resolved or until `timeout` elapses.
    ///
    /// Returns whether the info ended up resolved. Nothing is sent when the
    /// cache alone resolves it.
    pub fn request(&mut self, zc: &Zeroconf, timeout: Duration) -> Result<bool> {
        let now_ms = current_time_millis();
        for typ in [DnsType::Srv, DnsType::Txt] {
            if let Some(record) = zc.cached_record(&self.name, typ, DNSCLASS_INET)? {
                let server_address = server_address_for(zc, &record)?;
                self.update_record(now_ms, &record, server_address.as_ref());
            }
        }
        if self.address.is_none() {
            if let Some(record) = zc.cached_record(self.server_name(), DnsType::A, DNSCLASS_INET)? {
                self.update_record(now_ms, &record, None);
            }
        }
        if self.is_resolved() {
            return Ok(true);
        }

        let resolver = Arc::new(Resolver {
            info: Mutex::new(self.clone()),
            resolved: AtomicBool::new(false),
        });
        let listener: Arc<dyn RecordListener> = resolver.clone();
        zc.add_listener(
            Arc::clone(&listener),
            Some(&DnsQuestion::new(&self.name, DnsType::Any, DNSCLASS_INET)),
        )?;

        let result = resolver.resolve(zc, timeout);
        let removed = zc.remove_listener(&listener);
        *self = resolver.info.lock()?.clone();
        let resolved = result?;
        removed?;
        Ok(resolved)
    }

    // SRV/TXT (and A while the server is known) questions, with every live
    // cached answer included as a known answer.
    fn query(&self, zc: &Zeroconf, now_ms: u64) -> Result<DnsOutgoing> {
        let mut questions = vec![
            (self.name.clone(), DnsType::Srv),
            (self.name.clone(), DnsType::Txt),
        ];
        if let Some(server) = &self.server {
            questions.push((server.clone(), DnsType::A));
        }

        let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
        for (name, typ) in questions {
            out.add_question(DnsQuestion::new(&name, typ, DNSCLASS_INET));
            if let Some(known) = zc.cached_record(&name, typ, DNSCLASS_INET)? {
                out.add_answer_at_time(known, Some(now_ms));
            }
        }
        Ok(out)
    }

    pub(crate) fn ptr_record(&self, ttl: u32) -> DnsRecord {
        DnsRecord::pointer(&self.type_, DnsType::Ptr, DNSCLASS_INET.0, ttl, &self.name)
    }

    pub(crate) fn srv_record(&self, ttl: u32) -> DnsRecord {
        DnsRecord::service(
            &self.name,
            DNSCLASS_INET.0 | CLASS_UNIQUE,
            ttl,
            self.priority,
            self.weight,
            self.port,
            self.server_name(),
        )
    }

    pub(crate) fn txt_record(&self, ttl: u32) -> DnsRecord {
        let text = match &self.text {
            Some(text) if !text.is_empty() => text.clone(),
            _ => vec![0],
        };
        DnsRecord::text(&self.name, DNSCLASS_INET.0 | CLASS_UNIQUE, ttl, text)
    }

    pub(crate) fn address_record(&self, ttl: u32) -> Option<DnsRecord> {
        self.address.map(|addr| {
            DnsRecord::address(self.server_name(), DNSCLASS_INET.0 | CLASS_UNIQUE, ttl, addr)
        })
    }

    /// PTR, SRV, TXT and, when known, the address record.
    pub(crate) fn records(&self, ttl: u32) -> Vec<DnsRecord> {
        let mut records = vec![self.ptr_record(ttl), self.srv_record(ttl), self.txt_record(ttl)];
        records.extend(self.address_record(ttl));
        records
    }
}

impl PartialEq for ServiceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ServiceInfo {}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service[{},", self.name)?;
        match self.address {
            Some(addr) => write!(f, "{addr}:{}", self.port)?,
            None => write!(f, "-:{}", self.port)?,
        }
        write!(f, ",{} properties]", self.properties.len())
    }
}

fn server_address_for(zc: &Zeroconf, record: &DnsRecord) -> Result<Option<DnsRecord>> {
    match record.data() {
        RecordData::Service { server, .. } => zc.cached_record(server, DnsType::A, DNSCLASS_INET),
        _ => Ok(None),
    }
}

// Listener collecting the answers for one resolution.
struct Resolver {
    info: Mutex<ServiceInfo>,
    resolved: AtomicBool,
}

impl Resolver {
    fn resolve(&self, zc: &Zeroconf, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        let last = start + timeout;
        let mut delay = zc.config().resolve_initial_delay;
        let mut next = start + delay;

        loop {
            if self.resolved.load(Ordering::SeqCst) {
                return Ok(true);
            }
            if zc.is_done() {
                return Err(Error::ErrConnectionClosed);
            }
            let now = Instant::now();
            if last <= now {
                return Ok(false);
            }
            if next <= now {
                let info = self.info.lock()?.clone();
                let out = info.query(zc, current_time_millis())?;
                zc.send(&out, MDNS_DEST_ADDR);
                next = now + delay;
                delay *= 2;
            }
            zc.wait_unless(next.min(last) - now, || self.resolved.load(Ordering::SeqCst))?;
        }
    }
}

impl RecordListener for Resolver {
    fn update_record(&self, zc: &Zeroconf, now: u64, record: &DnsRecord) {
        // fetched before locking the info, the cache lock is taken here
        let server_address = match server_address_for(zc, record) {
            Ok(address) => address,
            Err(err) => {
                log::warn!("resolver: {err}");
                None
            }
        };
        let Ok(mut info) = self.info.lock() else {
            return;
        };
        info.update_record(now, record, server_address.as_ref());
        if info.is_resolved() {
            self.resolved.store(true, Ordering::SeqCst);
        }
    }
}
