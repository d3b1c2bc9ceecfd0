//! Distinguished names
//!
//! Identities are stored exactly as the directory (or caller) spelled them and
//! compared case-insensitively. All comparison goes through [`normalize`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Fold a name or attribute value for comparison.
///
/// Directory matching for names and identities is case-insensitive and
/// ignores surrounding whitespace.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Reverse [`escape_dn_value`] (backslash-char and backslash-hex pairs).
pub fn unescape_dn_value(value: &str) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let hex = raw
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(b) => {
                    bytes.push(b);
                    i += 3;
                }
                None => {
                    bytes.push(raw[i + 1]);
                    i += 2;
                }
            }
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Split a DN into its RDN components, honouring backslash escapes.
fn split_components(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = dn[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// A distinguished name: hierarchical, comma separated, most specific first.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dn(String);

impl Dn {
    /// Wrap an identity string as given.
    pub fn new(dn: impl Into<String>) -> Self {
        Self(dn.into())
    }

    /// Build `attr=value,parent`, escaping the value.
    pub fn from_rdn(attribute: &str, value: &str, parent: &Dn) -> Self {
        let rdn = format!("{}={}", attribute, escape_dn_value(value));
        if parent.is_root() {
            Self(rdn)
        } else {
            Self(format!("{},{}", rdn, parent.0))
        }
    }

    /// The identity exactly as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty (root DSE) name.
    pub fn is_root(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Lowercase, whitespace-canonical form used for comparison and external state.
    pub fn normalized(&self) -> String {
        self.normalized_components().join(",")
    }

    fn normalized_components(&self) -> Vec<String> {
        split_components(&self.0)
            .into_iter()
            .map(|component| match component.split_once('=') {
                Some((attr, value)) => format!("{}={}", normalize(attr), normalize(value)),
                None => normalize(component),
            })
            .collect()
    }

    /// The most specific component, e.g. `cn=web01`.
    pub fn rdn(&self) -> &str {
        split_components(&self.0).into_iter().next().unwrap_or("")
    }

    /// The naming attribute of the RDN, e.g. `cn`.
    pub fn rdn_attribute(&self) -> &str {
        self.rdn().split_once('=').map(|(a, _)| a.trim()).unwrap_or("")
    }

    /// The unescaped value of the RDN, e.g. `web01`.
    pub fn rdn_value(&self) -> String {
        self.rdn()
            .split_once('=')
            .map(|(_, v)| unescape_dn_value(v.trim()))
            .unwrap_or_default()
    }

    /// The containing entry, or `None` for a single-component name.
    pub fn parent(&self) -> Option<Dn> {
        let components = split_components(&self.0);
        if components.len() < 2 {
            return None;
        }
        Some(Dn(components[1..].join(",")))
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        let own = self.normalized_components();
        let base = ancestor.normalized_components();
        own.len() > base.len() && own[own.len() - base.len()..] == base[..]
    }

    /// Whether `self` is `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Replace the `old_base` suffix of this name with `new_base`.
    ///
    /// Returns `None` when `self` is not within `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if self == old_base {
            return Some(new_base.clone());
        }
        if !self.is_descendant_of(old_base) {
            return None;
        }
        let own = split_components(&self.0);
        let depth = own.len() - split_components(&old_base.0).len();
        Some(Dn(format!("{},{}", own[..depth].join(","), new_base.0)))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().cmp(&other.normalized())
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn({:?})", self.0)
    }
}

impl From<&str> for Dn {
    fn from(value: &str) -> Self {
        Dn::new(value)
    }
}

impl From<String> for Dn {
    fn from(value: String) -> Self {
        Dn::new(value)
    }
}

impl AsRef<str> for Dn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
