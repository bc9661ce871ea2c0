//! Periodic eviction of expired cache records.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use shared::error::{Error, Result};
use shared::time::current_time_millis;

use crate::proto::{Zeroconf, ZeroconfInner};

pub(crate) struct Reaper {
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts the reaper thread. It exits once the controller is done or
    /// dropped.
    pub(crate) fn spawn(zc: Weak<ZeroconfInner>, interval: Duration) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("astv-mdns-reaper".to_owned())
            .spawn(move || Reaper::run(zc, interval))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub(crate) fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) if handle.thread().id() == thread::current().id() => Ok(()),
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("mdns reaper thread panicked".to_owned())),
            None => Ok(()),
        }
    }

    fn run(zc: Weak<ZeroconfInner>, interval: Duration) {
        let mut deadline = Instant::now() + interval;
        loop {
            let Some(inner) = zc.upgrade() else {
                return;
            };
            let zc = Zeroconf { inner };
            if zc.is_done() {
                return;
            }

            let now = Instant::now();
            if now < deadline {
                if let Err(err) = zc.wait(deadline - now) {
                    log::warn!("mdns reaper: {err}");
                    return;
                }
                continue;
            }

            deadline = now + interval;
            if let Err(err) = zc.reap_expired(current_time_millis()) {
                log::warn!("mdns reaper: {err}");
            }
        }
    }
}
