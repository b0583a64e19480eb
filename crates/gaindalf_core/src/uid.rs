//! Namespaced entity identifiers.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Separator between namespace and id in the string form.
pub const UID_SEPARATOR: char = '-';

/// The id half of a [`Uid`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UidId {
    /// Allocated by an [`IncrementingUidFactory`].
    Int(u64),
    /// Caller supplied identifier.
    Text(String),
}

impl fmt::Display for UidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl fmt::Debug for UidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Stable identifier of an entity across all of its versions.
///
/// A UID is a `namespace` plus an `id`. The namespace selects the entity's
/// schema; the string form is `"{namespace}-{id}"`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid {
    namespace: String,
    id: UidId,
}

impl Uid {
    /// Creates a UID, validating both halves.
    ///
    /// Text ids made only of digits are rejected: their string form would
    /// read back as an integer id.
    pub fn new(namespace: impl Into<String>, id: UidId) -> CoreResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        if let UidId::Text(text) = &id {
            if text.is_empty()
                || is_all_digits(text)
                || !text.chars().all(|c| is_namespace_char(c) || c == '-')
            {
                return Err(CoreError::InvalidUid {
                    input: format!("{namespace}{UID_SEPARATOR}{text}"),
                });
            }
        }
        Ok(Self { namespace, id })
    }

    /// Creates a UID with an integer id.
    pub fn with_int(namespace: impl Into<String>, id: u64) -> CoreResult<Self> {
        Self::new(namespace, UidId::Int(id))
    }

    /// Creates a UID with a text id.
    pub fn with_text(namespace: impl Into<String>, id: impl Into<String>) -> CoreResult<Self> {
        Self::new(namespace, UidId::Text(id.into()))
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> &UidId {
        &self.id
    }
}

fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '#')
}

/// Checks that a namespace is non-empty and uses only `[A-Za-z0-9_@#]`.
pub fn validate_namespace(namespace: &str) -> CoreResult<()> {
    if namespace.is_empty() {
        return Err(CoreError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: "namespace must not be empty",
        });
    }
    if namespace.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: "namespace must not contain spaces",
        });
    }
    if !namespace.chars().all(is_namespace_char) {
        return Err(CoreError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: "namespace may only contain letters, digits, '_', '@' and '#'",
        });
    }
    Ok(())
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{UID_SEPARATOR}{}", self.namespace, self.id)
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

impl FromStr for Uid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidUid {
            input: s.to_string(),
        };
        let (namespace, id) = s.split_once(UID_SEPARATOR).ok_or_else(invalid)?;
        let id = if is_all_digits(id) {
            UidId::Int(id.parse().map_err(|_| invalid())?)
        } else {
            UidId::Text(id.to_string())
        };
        Self::new(namespace, id).map_err(|_| invalid())
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Allocates monotonically increasing integer UIDs per namespace, starting at 1.
#[derive(Debug, Default)]
pub struct IncrementingUidFactory {
    counters: Mutex<HashMap<String, u64>>,
}

impl IncrementingUidFactory {
    /// Creates a factory with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next UID in `namespace`.
    pub fn next(&self, namespace: &str) -> CoreResult<Uid> {
        validate_namespace(namespace)?;
        let mut counters = self.counters.lock();
        let counter = counters.entry(namespace.to_string()).or_insert(0);
        *counter += 1;
        Ok(Uid {
            namespace: namespace.to_string(),
            id: UidId::Int(*counter),
        })
    }

    /// Returns the last id handed out in `namespace`, or 0.
    pub fn current(&self, namespace: &str) -> u64 {
        self.counters.lock().get(namespace).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_and_parse() {
        let uid = Uid::with_int("Ledger", 12).unwrap();
        assert_eq!(uid.to_string(), "Ledger-12");
        assert_eq!("Ledger-12".parse::<Uid>().unwrap(), uid);

        let text = Uid::with_text("Instrument", "AAPL-US").unwrap();
        assert_eq!(text.to_string(), "Instrument-AAPL-US");
        assert_eq!("Instrument-AAPL-US".parse::<Uid>().unwrap(), text);
    }

    #[test]
    fn numeric_text_ids_are_rejected() {
        assert!(matches!(
            Uid::with_text("Ledger", "12"),
            Err(CoreError::InvalidUid { .. })
        ));
        assert!(Uid::with_text("Ledger", "007").is_err());
        assert!(Uid::with_text("Ledger", "12a").is_ok());
        assert!(Uid::with_text("Ledger", "1-2").is_ok());

        assert_eq!(
            "Ledger-007".parse::<Uid>().unwrap(),
            Uid::with_int("Ledger", 7).unwrap()
        );
        assert!("Ledger-+5".parse::<Uid>().is_err());
        assert!("Ledger-99999999999999999999".parse::<Uid>().is_err());
    }

    #[test]
    fn rejects_bad_namespaces() {
        assert!(Uid::with_int("", 1).is_err());
        assert!(Uid::with_int("my ledger", 1).is_err());
        assert!(Uid::with_int("a-b", 1).is_err());
        assert!("nodash".parse::<Uid>().is_err());
    }

    #[test]
    fn equality_over_pair() {
        let a = Uid::with_int("Ledger", 1).unwrap();
        let b = Uid::with_int("Transaction", 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, Uid::with_int("Ledger", 1).unwrap());
    }

    #[test]
    fn ordering() {
        let a = Uid::with_int("Ledger", 2).unwrap();
        let b = Uid::with_int("Ledger", 10).unwrap();
        assert!(a < b);
    }

    #[test]
    fn factory_counts_per_namespace() {
        let factory = IncrementingUidFactory::new();
        assert_eq!(factory.next("Ledger").unwrap().to_string(), "Ledger-1");
        assert_eq!(factory.next("Ledger").unwrap().to_string(), "Ledger-2");
        assert_eq!(factory.next("Transaction").unwrap().to_string(), "Transaction-1");
        assert_eq!(factory.current("Ledger"), 2);
        assert_eq!(factory.current("Unused"), 0);
        assert!(factory.next("bad ns").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let uid = Uid::with_int("Ledger", 3).unwrap();
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"Ledger-3\"");
        let back: Uid = serde_json::from_str("\"Ledger-3\"").unwrap();
        assert_eq!(back, uid);
    }

    fn uid_strategy() -> impl Strategy<Value = Uid> {
        let id = prop_oneof![
            any::<u64>().prop_map(UidId::Int),
            "[A-Za-z0-9_@#-]{1,12}"
                .prop_filter("digit-only text reads back as an integer", |t| !is_all_digits(t))
                .prop_map(UidId::Text),
        ];
        ("[A-Za-z0-9_@#]{1,8}", id).prop_map(|(namespace, id)| {
            Uid::new(namespace, id).unwrap()
        })
    }

    proptest! {
        #[test]
        fn string_form_round_trips(uid in uid_strategy()) {
            let parsed: Uid = uid.to_string().parse().unwrap();
            prop_assert_eq!(parsed, uid);
        }
    }
}
