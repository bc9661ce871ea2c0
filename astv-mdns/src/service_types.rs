//! Discovery of the service types advertised on the network.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shared::error::Result;

use crate::browser::{ServiceBrowser, ServiceEvent};
use crate::proto::{Zeroconf, SERVICE_TYPE_ENUMERATION};

/// Browses the DNS-SD type enumeration name for `timeout` and returns every
/// type seen, sorted and without duplicates.
pub fn find_service_types(zc: &Zeroconf, timeout: Duration) -> Result<Vec<String>> {
    let found = Arc::new(Mutex::new(BTreeSet::new()));

    let sink = Arc::clone(&found);
    let mut browser = ServiceBrowser::with_handler(zc, SERVICE_TYPE_ENUMERATION, move |_, event| {
        if let ServiceEvent::Added { name, .. } = event {
            if let Ok(mut found) = sink.lock() {
                found.insert(name.clone());
            }
        }
    })?;

    zc.wait_until(Instant::now() + timeout, false)?;
    browser.cancel()?;

    let types = found.lock()?.iter().cloned().collect();
    Ok(types)
}
