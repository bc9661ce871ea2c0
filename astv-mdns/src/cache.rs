use std::collections::HashMap;

use crate::message::{DnsClass, DnsEntry, DnsRecord, DnsType};

/// Records learned from the network, bucketed by lowercased name.
///
/// Newest records sit at the front of each bucket. Nothing expires on read;
/// the reaper evicts expired records.
#[derive(Debug, Default)]
pub struct DnsCache {
    cache: HashMap<String, Vec<DnsRecord>>,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: DnsRecord) {
        self.cache
            .entry(record.key().to_owned())
            .or_default()
            .insert(0, record);
    }

    /// Removes the cached copy of `record`, if any.
    pub fn remove(&mut self, record: &DnsRecord) -> Option<DnsRecord> {
        let list = self.cache.get_mut(record.key())?;
        let index = list.iter().position(|r| same_instance(r, record))?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.cache.remove(record.key());
        }
        Some(removed)
    }

    pub fn get(&self, entry: &DnsEntry) -> Option<&DnsRecord> {
        self.cache
            .get(entry.key())?
            .iter()
            .find(|r| r.entry() == entry)
    }

    /// The cached copy of `record`. Pointers under one name are distinct
    /// entries per alias, every other type matches on name, type and class.
    pub fn get_matching(&self, record: &DnsRecord) -> Option<&DnsRecord> {
        self.cache
            .get(record.key())?
            .iter()
            .find(|r| same_instance(r, record))
    }

    pub fn get_matching_mut(&mut self, record: &DnsRecord) -> Option<&mut DnsRecord> {
        self.cache
            .get_mut(record.key())?
            .iter_mut()
            .find(|r| same_instance(r, record))
    }

    pub fn get_by_details(&self, name: &str, typ: DnsType, class: DnsClass) -> Option<&DnsRecord> {
        self.get(&DnsEntry::new(name, typ, class.0))
    }

    pub fn entries_with_name(&self, name: &str) -> &[DnsRecord] {
        self.cache
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A live PTR record under `name` pointing at `alias`.
    pub fn current_entry_with_name_and_alias(
        &self,
        name: &str,
        alias: &str,
        now: u64,
    ) -> Option<&DnsRecord> {
        let alias = alias.to_lowercase();
        self.entries_with_name(name).iter().find(|r| {
            r.typ() == DnsType::Ptr
                && !r.is_expired(now)
                && r.alias().map(str::to_lowercase).as_deref() == Some(alias.as_str())
        })
    }

    /// Copies every cached record.
    pub fn entries(&self) -> Vec<DnsRecord> {
        self.cache.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn same_instance(cached: &DnsRecord, record: &DnsRecord) -> bool {
    if cached != record {
        return false;
    }
    match (cached.alias(), record.alias()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}
