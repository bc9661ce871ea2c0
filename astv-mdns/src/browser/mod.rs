#[cfg(test)]
mod browser_test;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use shared::error::{Error, Result};
use shared::time::{instant_at, millis_at};

use crate::message::*;
use crate::naming::service_type_name;
use crate::proto::{RecordListener, Zeroconf, MDNS_DEST_ADDR};

/// Change in the set of instances of a browsed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Added { service_type: String, name: String },
    Removed { service_type: String, name: String },
}

impl ServiceEvent {
    pub fn service_type(&self) -> &str {
        match self {
            ServiceEvent::Added { service_type, .. } | ServiceEvent::Removed { service_type, .. } => {
                service_type
            }
        }
    }

    /// Full instance name.
    pub fn name(&self) -> &str {
        match self {
            ServiceEvent::Added { name, .. } | ServiceEvent::Removed { name, .. } => name,
        }
    }

    /// The instance label, without the type suffix.
    pub fn instance_name(&self) -> &str {
        let cut = self.name().len().saturating_sub(self.service_type().len() + 1);
        self.name().get(..cut).unwrap_or(self.name())
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEvent::Added { name, .. } => write!(f, "added {name}"),
            ServiceEvent::Removed { name, .. } => write!(f, "removed {name}"),
        }
    }
}

/// Callback for browser events, run on the browser thread.
pub type ServiceHandler = Box<dyn Fn(&Zeroconf, &ServiceEvent) + Send + Sync>;

struct BrowserState {
    // lowercased instance name -> PTR record
    services: HashMap<String, DnsRecord>,
    next_time: Instant,
    delay: Duration,
    events: VecDeque<ServiceEvent>,
}

struct BrowserInner {
    type_: String,
    key: String,
    state: Mutex<BrowserState>,
    done: AtomicBool,
    handlers: Vec<ServiceHandler>,
}

impl BrowserInner {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn has_events(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.events.is_empty())
            .unwrap_or(true)
    }
}

impl RecordListener for BrowserInner {
    fn update_record(&self, _zc: &Zeroconf, now: u64, record: &DnsRecord) {
        if record.typ() != DnsType::Ptr || record.key() != self.key {
            return;
        }
        let Some(alias) = record.alias() else {
            return;
        };
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let service_key = alias.to_lowercase();
        let expired = record.is_expired(now);
        if state.services.contains_key(&service_key) {
            if expired {
                state.services.remove(&service_key);
                state.events.push_back(ServiceEvent::Removed {
                    service_type: self.type_.clone(),
                    name: alias.to_owned(),
                });
                return;
            } else if let Some(known) = state.services.get_mut(&service_key) {
                known.reset_ttl(record);
            }
        } else if expired {
            return;
        } else {
            state.services.insert(service_key, record.clone());
            state.events.push_back(ServiceEvent::Added {
                service_type: self.type_.clone(),
                name: alias.to_owned(),
            });
        }

        // requery before three quarters of the lifetime has passed
        let expires = instant_at(record.expiration_time(75));
        if expires < state.next_time {
            state.next_time = expires;
        }
    }
}

/// Continuously browses one service type.
///
/// The browser queries with exponential back-off (known answers included, so
/// peers stay quiet about what we already know) and calls its handlers on a
/// dedicated thread for every instance that appears or disappears.
/// Dropping the browser cancels it.
pub struct ServiceBrowser {
    zc: Zeroconf,
    inner: Arc<BrowserInner>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceBrowser {
    pub fn new(zc: &Zeroconf, type_: &str, handlers: Vec<ServiceHandler>) -> Result<Self> {
        service_type_name(type_)?;
        if handlers.is_empty() {
            return Err(Error::ErrNoServiceHandler);
        }

        let inner = Arc::new(BrowserInner {
            type_: type_.to_owned(),
            key: type_.to_lowercase(),
            state: Mutex::new(BrowserState {
                services: HashMap::new(),
                next_time: Instant::now(),
                delay: zc.config().browser_initial_delay,
                events: VecDeque::new(),
            }),
            done: AtomicBool::new(false),
            handlers,
        });

        let listener: Arc<dyn RecordListener> = inner.clone();
        zc.add_listener(
            listener,
            Some(&DnsQuestion::new(type_, DnsType::Ptr, DNSCLASS_INET)),
        )?;

        let thread_zc = zc.clone();
        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("astv-mdns-browser".to_owned())
            .spawn(move || {
                if let Err(err) = ServiceBrowser::run(&thread_zc, &thread_inner) {
                    log::warn!("browser {}: {err}", thread_inner.type_);
                }
            })?;
        log::debug!("browser {type_}: started");

        Ok(Self {
            zc: zc.clone(),
            inner,
            handle: Some(handle),
        })
    }

    /// Convenience for a browser with a single handler.
    pub fn with_handler<F>(zc: &Zeroconf, type_: &str, handler: F) -> Result<Self>
    where
        F: Fn(&Zeroconf, &ServiceEvent) + Send + Sync + 'static,
    {
        Self::new(zc, type_, vec![Box::new(handler)])
    }

    pub fn service_type(&self) -> &str {
        &self.inner.type_
    }

    /// Instance names currently known.
    pub fn services(&self) -> Result<Vec<String>> {
        let state = self.inner.state.lock()?;
        Ok(state
            .services
            .values()
            .filter_map(|record| record.alias().map(str::to_owned))
            .collect())
    }

    /// Stops the browser thread and unregisters its listener.
    pub fn cancel(&mut self) -> Result<()> {
        self.inner.done.store(true, Ordering::SeqCst);
        let listener: Arc<dyn RecordListener> = self.inner.clone();
        self.zc.remove_listener(&listener)?;

        match self.handle.take() {
            // cancelled from one of our own handlers
            Some(handle) if handle.thread().id() == thread::current().id() => Ok(()),
            Some(handle) => {
                handle
                    .join()
                    .map_err(|_| Error::Other("service browser thread panicked".to_owned()))?;
                log::debug!("browser {}: cancelled", self.inner.type_);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn run(zc: &Zeroconf, inner: &BrowserInner) -> Result<()> {
        let max_delay = zc.config().browser_max_delay;
        loop {
            let now = Instant::now();
            let next_time = inner.state.lock()?.next_time;
            if next_time > now {
                zc.wait_unless(next_time - now, || inner.is_done() || inner.has_events())?;
            }
            if zc.is_done() || inner.is_done() {
                return Ok(());
            }

            let now = Instant::now();
            let query = {
                let mut state = inner.state.lock()?;
                if state.next_time <= now {
                    let now_ms = millis_at(now);
                    let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
                    out.add_question(DnsQuestion::new(&inner.type_, DnsType::Ptr, DNSCLASS_INET));
                    for record in state.services.values() {
                        if !record.is_stale(now_ms) {
                            out.add_answer_at_time(record.clone(), Some(now_ms));
                        }
                    }
                    state.next_time = now + state.delay;
                    state.delay = (state.delay * 2).min(max_delay);
                    Some(out)
                } else {
                    None
                }
            };
            if let Some(out) = query {
                zc.send(&out, MDNS_DEST_ADDR);
            }

            let event = inner.state.lock()?.events.pop_front();
            if let Some(event) = event {
                log::debug!("browser {}: {event}", inner.type_);
                for handler in &inner.handlers {
                    handler(zc, &event);
                }
            }
        }
    }
}

impl Drop for ServiceBrowser {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.cancel() {
                log::warn!("browser {}: {err}", self.inner.type_);
            }
        }
    }
}
