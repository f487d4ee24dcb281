//! Document identities and the model/store key mapping
//!
//! At the model surface an identity is a 24 hex-digit string under `id`.
//! In the store it lives under `_id` in the extended form `{"$oid": "<hex>"}`.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity key as seen by models
pub const MODEL_KEY: &str = "id";

/// Identity key as stored
pub const STORE_KEY: &str = "_id";

const OID_TAG: &str = "$oid";

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(rand::random);
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff));

/// 12 byte document identity: seconds since epoch, process-unique bytes, counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a new identity
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parse the 24 hex-digit form
    pub fn parse_str(s: &str) -> Option<Self> {
        if s.len() != 24 {
            return None;
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Store representation
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(OID_TAG.to_string(), Value::String(self.to_hex()));
        Value::Object(map)
    }

    /// Read the store representation back
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_object()
            .filter(|map| map.len() == 1)
            .and_then(|map| map.get(OID_TAG))
            .and_then(Value::as_str)
            .and_then(Self::parse_str)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| format!("'{}' is not a valid object id", s))
    }
}

/// Rewrite the model identity key to the store key
pub fn normalize_key(field: &str) -> String {
    if field == MODEL_KEY {
        STORE_KEY.to_string()
    } else {
        field.to_string()
    }
}

/// Fields whose values are identities: `id`, `_id`, `*_id` and id lists `*_ids`
pub fn is_identity_field(field: &str) -> bool {
    let last = field.rsplit('.').next().unwrap_or(field);
    last == MODEL_KEY || last.ends_with("_id") || last.ends_with("_ids")
}

/// Coerce valid hex strings (or arrays of them) into the store representation
pub fn coerce_identity(value: Value) -> Value {
    match value {
        Value::String(s) => match ObjectId::parse_str(&s) {
            Some(id) => id.to_value(),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_identity).collect()),
        other => other,
    }
}

/// Convert store identities back to hex strings, recursively
pub fn reveal_identity(value: Value) -> Value {
    if let Some(id) = ObjectId::from_value(&value) {
        return Value::String(id.to_hex());
    }

    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(reveal_identity).collect()),
        Value::Object(map) => Value::Object(prepare_to_read(map)),
        other => other,
    }
}

/// Model document to store document: `id` becomes `_id`, identities become native
pub fn prepare_to_store(document: Map<String, Value>) -> Map<String, Value> {
    document
        .into_iter()
        .map(|(key, value)| {
            let value = if is_identity_field(&key) {
                coerce_identity(value)
            } else {
                match value {
                    Value::Object(map) => Value::Object(prepare_to_store(map)),
                    Value::Array(items) => Value::Array(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::Object(map) => Value::Object(prepare_to_store(map)),
                                other => other,
                            })
                            .collect(),
                    ),
                    other => other,
                }
            };
            (normalize_key(&key), value)
        })
        .collect()
}

/// Store document to model document: `_id` becomes `id`, identities become hex
pub fn prepare_to_read(document: Map<String, Value>) -> Map<String, Value> {
    document
        .into_iter()
        .map(|(key, value)| {
            let key = if key == STORE_KEY {
                MODEL_KEY.to_string()
            } else {
                key
            };
            (key, reveal_identity(value))
        })
        .collect()
}
