use std::fmt;
use std::hash::{Hash, Hasher};

use super::record::DnsRecord;
use super::*;

/// Identity shared by questions and records: a name, a type and a class.
///
/// The name keeps its original case for display and the wire; comparisons go
/// through the lowercased `key`.
#[derive(Debug, Clone)]
pub struct DnsEntry {
    key: String,
    name: String,
    typ: DnsType,
    class: DnsClass,
    unique: bool,
}

impl DnsEntry {
    /// Creates an entry from a wire class, splitting off the unique bit.
    pub fn new(name: &str, typ: DnsType, class: u16) -> Self {
        Self {
            key: name.to_lowercase(),
            name: name.to_owned(),
            typ,
            class: DnsClass(class & CLASS_MASK),
            unique: class & CLASS_UNIQUE != 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn typ(&self) -> DnsType {
        self.typ
    }

    pub fn class(&self) -> DnsClass {
        self.class
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Class as written on the wire, with the unique bit when set.
    pub(crate) fn wire_class(&self) -> u16 {
        if self.unique {
            self.class.0 | CLASS_UNIQUE
        } else {
            self.class.0
        }
    }

    pub(crate) fn fmt_with(&self, f: &mut fmt::Formatter<'_>, kind: &str) -> fmt::Result {
        write!(
            f,
            "{}[{},{}{},{}]",
            kind,
            self.typ,
            self.class,
            if self.unique { "-unique" } else { "" },
            self.name
        )
    }
}

impl PartialEq for DnsEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.typ == other.typ && self.class == other.class
    }
}

impl Eq for DnsEntry {}

impl Hash for DnsEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.typ.hash(state);
        self.class.hash(state);
    }
}

impl fmt::Display for DnsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, "entry")
    }
}

/// A question in a DNS query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsQuestion {
    entry: DnsEntry,
}

impl DnsQuestion {
    pub fn new(name: &str, typ: DnsType, class: DnsClass) -> Self {
        Self {
            entry: DnsEntry::new(name, typ, class.0),
        }
    }

    pub(crate) fn from_wire(name: &str, typ: DnsType, class: u16) -> Self {
        Self {
            entry: DnsEntry::new(name, typ, class),
        }
    }

    pub fn entry(&self) -> &DnsEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn key(&self) -> &str {
        self.entry.key()
    }

    pub fn typ(&self) -> DnsType {
        self.entry.typ()
    }

    pub fn class(&self) -> DnsClass {
        self.entry.class()
    }

    /// Whether `record` answers this question: same class and name, and the
    /// same type unless the question asks for any type.
    pub fn answered_by(&self, record: &DnsRecord) -> bool {
        self.entry.class == record.class()
            && (self.entry.typ == record.typ() || self.entry.typ == DnsType::Any)
            && self.entry.key == record.key()
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entry.fmt_with(f, "question")
    }
}
