//! Socket engine: one background thread multiplexing every registered socket.

use std::collections::HashMap;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use polling::{Event, Poller};
use shared::error::{Error, Result};

/// Consumer of a readable socket. Called on the engine thread.
pub(crate) trait Reader: Send + Sync {
    fn handle_read(&self, socket: &UdpSocket);
}

struct Registration {
    socket: Arc<UdpSocket>,
    reader: Arc<dyn Reader>,
}

#[derive(Default)]
struct EngineState {
    next_key: usize,
    readers: HashMap<usize, Registration>,
}

struct EngineInner {
    state: Mutex<EngineState>,
    condition: Condvar,
    poller: Poller,
    done: Arc<AtomicBool>,
    idle_wait: Duration,
    poll_timeout: Duration,
}

pub(crate) struct Engine {
    inner: Arc<EngineInner>,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Engine {
    /// Starts the engine thread. It runs until `done` is set.
    pub(crate) fn new(
        done: Arc<AtomicBool>,
        idle_wait: Duration,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let inner = Arc::new(EngineInner {
            state: Mutex::new(EngineState::default()),
            condition: Condvar::new(),
            poller: Poller::new()?,
            done,
            idle_wait,
            poll_timeout,
        });

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("astv-mdns-engine".to_owned())
            .spawn(move || Engine::run(thread_inner))?;

        Ok(Self {
            inner,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Registers `socket`; `reader` is called whenever it becomes readable.
    pub(crate) fn add_reader(&self, reader: Arc<dyn Reader>, socket: Arc<UdpSocket>) -> Result<usize> {
        let key = {
            let mut state = self.inner.state.lock()?;
            let key = state.next_key;
            state.next_key += 1;
            self.inner.poller.add(&*socket, Event::readable(key))?;
            state.readers.insert(key, Registration { socket, reader });
            key
        };
        log::trace!("engine: added reader {key}");
        self.wake()?;
        Ok(key)
    }

    pub(crate) fn delete_reader(&self, key: usize) -> Result<()> {
        let removed = self.inner.state.lock()?.readers.remove(&key);
        if let Some(registration) = removed {
            if let Err(err) = self.inner.poller.delete(&*registration.socket) {
                log::debug!("engine: failed to deregister reader {key}: {err}");
            }
            log::trace!("engine: deleted reader {key}");
        }
        self.wake()
    }

    pub(crate) fn reader_count(&self) -> Result<usize> {
        Ok(self.inner.state.lock()?.readers.len())
    }

    fn wake(&self) -> Result<()> {
        {
            let _state = self.inner.state.lock()?;
            self.inner.condition.notify_all();
        }
        self.inner.poller.notify()?;
        Ok(())
    }

    /// Wakes the engine thread so it notices `done`, without waiting for it.
    pub(crate) fn stop(&self) {
        if let Err(err) = self.wake() {
            log::debug!("engine: failed to wake: {err}");
        }
    }

    /// Waits for the engine thread, returning the socket error that stopped
    /// it, if any. The caller sets `done` first.
    pub(crate) fn join(&self) -> Result<()> {
        self.wake()?;
        let handle = self.handle.lock()?.take();
        match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => Ok(()),
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("mdns engine thread panicked".to_owned()))?,
            None => Ok(()),
        }
    }

    fn run(inner: Arc<EngineInner>) -> Result<()> {
        let mut events = Vec::new();

        while !inner.done.load(Ordering::SeqCst) {
            {
                let state = inner.state.lock()?;
                if state.readers.is_empty() {
                    if inner.done.load(Ordering::SeqCst) {
                        break;
                    }
                    let _ = inner.condition.wait_timeout(state, inner.idle_wait)?;
                    continue;
                }
            }

            events.clear();
            if let Err(err) = inner.poller.wait(&mut events, Some(inner.poll_timeout)) {
                if inner.done.load(Ordering::SeqCst) {
                    break;
                }
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("engine: poll failed: {err}");
                return Err(err.into());
            }

            for ev in &events {
                let registration = {
                    let state = inner.state.lock()?;
                    state
                        .readers
                        .get(&ev.key)
                        .map(|r| (Arc::clone(&r.socket), Arc::clone(&r.reader)))
                };
                let Some((socket, reader)) = registration else {
                    continue;
                };

                reader.handle_read(&socket);

                // oneshot interest, re-arm
                if let Err(err) = inner.poller.modify(&*socket, Event::readable(ev.key)) {
                    if inner.done.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!("engine: failed to re-arm reader {}: {err}", ev.key);
                }
            }
        }

        log::debug!("engine: stopped");
        Ok(())
    }
}
