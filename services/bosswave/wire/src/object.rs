//! Metadata pairs and the opaque objects carried by a frame.
//!
//! Object contents are never interpreted here. Routing objects carry access
//! chains and entity material, payload objects carry application data; both
//! are decoded by higher layers that understand the security scheme.

use crate::WireError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Key/value metadata pair
///
/// Values are stored as immutable [`Bytes`], so every accessor hands out a
/// view that cannot be used to alter the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    key: String,
    value: Bytes,
}

impl KvPair {
    /// Create a new pair
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Pair key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pair value
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    /// Pair value as a byte slice
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }
}

/// Routing object type tag
pub type RoutingType = u8;

/// Opaque routing object (access chains, entities, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingObject {
    ro_type: RoutingType,
    content: Bytes,
}

impl RoutingObject {
    /// Create a new routing object
    pub fn new(ro_type: RoutingType, content: impl Into<Bytes>) -> Self {
        Self {
            ro_type,
            content: content.into(),
        }
    }

    /// Type tag
    pub fn ro_type(&self) -> RoutingType {
        self.ro_type
    }

    /// Opaque content
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }
}

/// Payload object type
///
/// A 32-bit number conventionally written in dotted-quad form, e.g.
/// `64.0.1.0` for plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadType(pub u32);

impl PayloadType {
    /// Build a type from its four dotted components
    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(octets))
    }

    /// Dotted components
    pub const fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Wire form, `a.b.c.d:n`
    pub fn to_wire(self) -> String {
        format!("{}:{}", self, self.0)
    }

    /// Parse the wire form.
    ///
    /// Either half may be empty (`a.b.c.d:` or `:n`); when both are present
    /// they must name the same type.
    pub fn from_wire(s: &str) -> Option<Self> {
        let (dotted, num) = s.split_once(':')?;
        let dotted = if dotted.is_empty() {
            None
        } else {
            Some(dotted.parse::<PayloadType>().ok()?)
        };
        let num = if num.is_empty() {
            None
        } else {
            Some(PayloadType(num.parse::<u32>().ok()?))
        };

        match (dotted, num) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(_), Some(_)) => None,
            (Some(t), None) | (None, Some(t)) => Some(t),
            (None, None) => None,
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl FromStr for PayloadType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || WireError::invalid(format!("bad payload type {:?}", s));
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            *octet = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(bad)?;
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(PayloadType::from_octets(octets))
    }
}

/// Opaque payload object (application data)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadObject {
    po_type: PayloadType,
    content: Bytes,
}

impl PayloadObject {
    /// Create a new payload object
    pub fn new(po_type: PayloadType, content: impl Into<Bytes>) -> Self {
        Self {
            po_type,
            content: content.into(),
        }
    }

    /// Payload type
    pub fn po_type(&self) -> PayloadType {
        self.po_type
    }

    /// Opaque content
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }
}
