//! Entry codec: canonical bytes and digests.
//!
//! The canonical form is a versioned, length-prefixed binary layout. Every
//! hashable field is written explicitly, in a fixed order, so nothing can be
//! omitted by accident and nothing depends on in-memory field order or on
//! the order a producer inserted `details` keys.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//!   magic            "CHLG"
//!   format version   u8 (= 1)
//!   hash algorithm   str            e.g. "sha256"
//!   sequence         u64
//!   timestamp        i64 unix seconds, u32 nanoseconds
//!   actor            u8 0 (system) | u8 1 + str
//!   action_type      str            wire name, e.g. "LOGIN_FAILED"
//!   resource_type    str
//!   resource_id      opt-str        u8 0 | u8 1 + str
//!   resource_name    opt-str
//!   details          value
//!   ip_address       opt-str
//!   is_rollbackable  u8 0 | 1
//!   previous_hash    str
//!
//!   str   = u32 byte length + UTF-8 bytes
//!   value = tag u8 followed by:
//!           0 null | 1 false | 2 true | 3 i64 | 4 f64 bits | 5 str
//!           6 list: u32 count + values
//!           7 map:  u32 count + (str key, value)*, keys strictly ascending
//! ```
//!
//! `decode` accepts only bytes `canonicalize` could have produced, so the
//! form is idempotent: `canonicalize(decode(b)) == b`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use chainlog_contracts::{
    entry::{ActionType, Actor, AuditEntry, HashAlgorithm},
    error::{ChainlogError, ChainlogResult},
    value::DetailValue,
};

const MAGIC: &[u8; 4] = b"CHLG";

/// Bumped whenever the layout above changes.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum nesting of lists/maps inside `details`.
pub const MAX_DEPTH: usize = 64;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_TEXT: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;

/// Every field bound into an entry's hash.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFields {
    pub hash_algorithm: HashAlgorithm,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub action_type: ActionType,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub details: DetailValue,
    pub ip_address: Option<String>,
    pub is_rollbackable: bool,
    pub previous_hash: String,
}

impl CanonicalFields {
    /// The hashable view of a stored entry, using its stored `previous_hash`.
    pub fn from_entry(entry: &AuditEntry) -> Self {
        Self {
            hash_algorithm: entry.hash_algorithm,
            sequence: entry.sequence,
            timestamp: entry.timestamp,
            actor: entry.actor.clone(),
            action_type: entry.action_type,
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
            resource_name: entry.resource_name.clone(),
            details: entry.details.clone(),
            ip_address: entry.ip_address.clone(),
            is_rollbackable: entry.is_rollbackable,
            previous_hash: entry.previous_hash.clone(),
        }
    }

    /// Compute the digest of these fields under their own `hash_algorithm`.
    pub fn entry_hash(&self) -> ChainlogResult<String> {
        let bytes = canonicalize(self)?;
        Ok(digest(self.hash_algorithm, &bytes))
    }
}

/// Lowercase hex digest of `bytes`.
pub fn digest(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
    }
}

/// Recompute the hash a stored entry should carry, from its own fields.
pub fn recompute_entry_hash(entry: &AuditEntry) -> ChainlogResult<String> {
    CanonicalFields::from_entry(entry).entry_hash()
}

/// Produce the canonical byte string for `fields`.
///
/// Fails with `EncodingFailure` for values with no canonical form:
/// non-finite floats, over-deep nesting, or strings longer than `u32::MAX`.
pub fn canonicalize(fields: &CanonicalFields) -> ChainlogResult<Vec<u8>> {
    let mut w = Writer::default();
    w.raw(MAGIC);
    w.u8(FORMAT_VERSION);
    w.str(fields.hash_algorithm.identifier())?;
    w.u64(fields.sequence);
    w.i64(fields.timestamp.timestamp());
    w.u32(fields.timestamp.timestamp_subsec_nanos());
    match &fields.actor {
        Actor::System => w.u8(0),
        Actor::Principal(id) => {
            w.u8(1);
            w.str(id)?;
        }
    }
    w.str(fields.action_type.as_str())?;
    w.str(&fields.resource_type)?;
    w.opt_str(fields.resource_id.as_deref())?;
    w.opt_str(fields.resource_name.as_deref())?;
    w.value(&fields.details, 0)?;
    w.opt_str(fields.ip_address.as_deref())?;
    w.u8(u8::from(fields.is_rollbackable));
    w.str(&fields.previous_hash)?;
    Ok(w.buf)
}

/// Parse canonical bytes back into fields.
///
/// Unknown action names fail with `InvalidAction`; every other deviation
/// from the layout (bad magic, unknown version, trailing bytes, unsorted
/// map keys, truncated input) fails with `EncodingFailure`.
pub fn decode(bytes: &[u8]) -> ChainlogResult<CanonicalFields> {
    let mut r = Reader { buf: bytes, pos: 0 };

    if r.take(MAGIC.len())? != MAGIC {
        return Err(encoding("missing canonical-form magic"));
    }
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(encoding(format!("unsupported format version {version}")));
    }

    let hash_algorithm: HashAlgorithm = r.str()?.parse()?;
    let sequence = r.u64()?;
    let secs = r.i64()?;
    let nanos = r.u32()?;
    let timestamp = DateTime::<Utc>::from_timestamp(secs, nanos)
        .ok_or_else(|| encoding(format!("timestamp {secs}.{nanos} out of range")))?;
    let actor = match r.u8()? {
        0 => Actor::System,
        1 => Actor::Principal(r.str()?),
        other => return Err(encoding(format!("unknown actor tag {other}"))),
    };
    let action_type: ActionType = r.str()?.parse()?;
    let resource_type = r.str()?;
    let resource_id = r.opt_str()?;
    let resource_name = r.opt_str()?;
    let details = r.value(0)?;
    let ip_address = r.opt_str()?;
    let is_rollbackable = match r.u8()? {
        0 => false,
        1 => true,
        other => return Err(encoding(format!("invalid boolean byte {other}"))),
    };
    let previous_hash = r.str()?;

    if r.pos != bytes.len() {
        return Err(encoding(format!(
            "{} trailing byte(s) after canonical form",
            bytes.len() - r.pos
        )));
    }

    Ok(CanonicalFields {
        hash_algorithm,
        sequence,
        timestamp,
        actor,
        action_type,
        resource_type,
        resource_id,
        resource_name,
        details,
        ip_address,
        is_rollbackable,
        previous_hash,
    })
}

fn encoding(reason: impl Into<String>) -> ChainlogError {
    ChainlogError::EncodingFailure {
        reason: reason.into(),
    }
}

fn len_u32(len: usize, what: &str) -> ChainlogResult<u32> {
    u32::try_from(len).map_err(|_| encoding(format!("{what} length {len} exceeds u32")))
}

// ── Writer ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.raw(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.raw(&v.to_be_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.raw(&v.to_be_bytes());
    }

    fn str(&mut self, s: &str) -> ChainlogResult<()> {
        self.u32(len_u32(s.len(), "string")?);
        self.raw(s.as_bytes());
        Ok(())
    }

    fn opt_str(&mut self, s: Option<&str>) -> ChainlogResult<()> {
        match s {
            None => self.u8(0),
            Some(s) => {
                self.u8(1);
                self.str(s)?;
            }
        }
        Ok(())
    }

    fn value(&mut self, value: &DetailValue, depth: usize) -> ChainlogResult<()> {
        if depth > MAX_DEPTH {
            return Err(encoding(format!("details nested deeper than {MAX_DEPTH}")));
        }
        match value {
            DetailValue::Null => self.u8(TAG_NULL),
            DetailValue::Bool(false) => self.u8(TAG_FALSE),
            DetailValue::Bool(true) => self.u8(TAG_TRUE),
            DetailValue::Integer(i) => {
                self.u8(TAG_INTEGER);
                self.i64(*i);
            }
            DetailValue::Float(f) => {
                if !f.is_finite() {
                    return Err(encoding(format!("non-finite float {f} in details")));
                }
                // -0.0 and 0.0 compare equal, so they must encode equal.
                let f = if *f == 0.0 { 0.0f64 } else { *f };
                self.u8(TAG_FLOAT);
                self.u64(f.to_bits());
            }
            DetailValue::Text(s) => {
                self.u8(TAG_TEXT);
                self.str(s)?;
            }
            DetailValue::List(items) => {
                self.u8(TAG_LIST);
                self.u32(len_u32(items.len(), "list")?);
                for item in items {
                    self.value(item, depth + 1)?;
                }
            }
            DetailValue::Map(map) => {
                self.u8(TAG_MAP);
                self.u32(len_u32(map.len(), "map")?);
                // BTreeMap iteration is ascending by key bytes.
                for (key, item) in map {
                    self.str(key)?;
                    self.value(item, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ChainlogResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| encoding(format!("truncated canonical form at byte {}", self.pos)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> ChainlogResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> ChainlogResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> ChainlogResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> ChainlogResult<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> ChainlogResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn str(&mut self) -> ChainlogResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| encoding(format!("invalid UTF-8: {e}")))
    }

    fn opt_str(&mut self) -> ChainlogResult<Option<String>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.str()?)),
            other => Err(encoding(format!("invalid option tag {other}"))),
        }
    }

    fn value(&mut self, depth: usize) -> ChainlogResult<DetailValue> {
        if depth > MAX_DEPTH {
            return Err(encoding(format!("details nested deeper than {MAX_DEPTH}")));
        }
        let tag = self.u8()?;
        Ok(match tag {
            TAG_NULL => DetailValue::Null,
            TAG_FALSE => DetailValue::Bool(false),
            TAG_TRUE => DetailValue::Bool(true),
            TAG_INTEGER => DetailValue::Integer(self.i64()?),
            TAG_FLOAT => {
                let f = f64::from_bits(self.u64()?);
                if !f.is_finite() || (f == 0.0 && f.is_sign_negative()) {
                    return Err(encoding("non-canonical float encoding"));
                }
                DetailValue::Float(f)
            }
            TAG_TEXT => DetailValue::Text(self.str()?),
            TAG_LIST => {
                let count = self.u32()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                DetailValue::List(items)
            }
            TAG_MAP => {
                let count = self.u32()?;
                let mut map = BTreeMap::new();
                let mut prev: Option<String> = None;
                for _ in 0..count {
                    let key = self.str()?;
                    if prev.as_ref().is_some_and(|p| *p >= key) {
                        return Err(encoding(format!("map key '{key}' out of canonical order")));
                    }
                    let item = self.value(depth + 1)?;
                    prev = Some(key.clone());
                    map.insert(key, item);
                }
                DetailValue::Map(map)
            }
            other => return Err(encoding(format!("unknown value tag {other}"))),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
