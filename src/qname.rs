// Qualified names: (namespace URI, local name) with a display prefix
use compact_str::CompactString;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A namespace-qualified name.
///
/// Identity is `(namespace, local_name)`. The prefix is only kept for display,
/// since several prefixes may be bound to the same namespace.
#[derive(Debug, Clone)]
pub struct QName {
    namespace: CompactString,
    local_name: CompactString,
    prefix: Option<CompactString>,
}

impl QName {
    pub fn new(
        namespace: impl Into<CompactString>,
        local_name: impl Into<CompactString>,
        prefix: Option<&str>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
            prefix: prefix.filter(|p| !p.is_empty()).map(CompactString::from),
        }
    }

    /// Parses `{namespace}local`. Returns `None` for anything else.
    pub fn from_clark(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('{')?;
        let (namespace, local) = rest.split_once('}')?;
        if local.is_empty() || local.contains(':') {
            return None;
        }
        Some(Self::new(namespace, local, None))
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[inline]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(CompactString::from(prefix)).filter(|p| !p.is_empty());
        self
    }

    pub fn clark(&self) -> String {
        if self.namespace.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_name.hash(state);
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.local_name.cmp(&other.local_name))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_name),
            None => f.write_str(&self.clark()),
        }
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
