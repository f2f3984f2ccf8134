//! Envelope Wire Codec
//!
//! An envelope is `(destination local path, message)`. On the wire:
//!
//! ```text
//! ┌────────┬─────────┬──────────────────────────────────────────────┐
//! │ "ACTR" │ version │ bincode(WireEnvelope { path, payload })      │
//! │ 4 B    │ 1 B     │ fixint, little endian, size limited          │
//! └────────┴─────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Refs are substituted by a tagged [`WireRef`] marker holding the rendered
//! uri and the sender's view of locality. Decoding never trusts that flag:
//! each marker is turned back into a [`Ref`] by the *receiving* node's lookup,
//! so locality is always recomputed where the message lands.
//!
//! The nesting limit is enforced while bincode walks the payload, so a frame
//! that fits the size limit but nests too deeply is rejected before it can
//! exhaust the stack.

use crate::error::{RemotingError, Result};
use crate::message::Message;
use crate::reference::Ref;
use addressing::{NodeId, Uri};
use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::{
    self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Wire format constants
pub struct WireFormat;

impl WireFormat {
    /// Protocol version
    pub const VERSION: u8 = 1;
    /// Magic bytes for frame validation
    pub const MAGIC: &'static [u8; 4] = b"ACTR";
    /// Magic plus version
    pub const HEADER_SIZE: usize = 5;
}

#[derive(Debug, Serialize)]
struct WireEnvelope {
    path: String,
    payload: WireValue,
}

/// Variant order is the wire tag; keep [`WireTag`] in step
#[derive(Debug, Serialize)]
enum WireValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<WireValue>),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    Ref(WireRef),
}

/// Substitution marker for a [`Ref`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRef {
    pub uri: String,
    pub is_local: bool,
}

/// Decoded inbound envelope
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Destination path on the receiving node (no node component)
    pub path: Uri,
    pub message: Message,
}

/// Encoder/decoder with size and nesting limits
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_envelope_bytes: u64,
    max_depth: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(
            node_config::defaults::remoting::MAX_ENVELOPE_BYTES,
            node_config::defaults::remoting::MAX_MESSAGE_DEPTH,
        )
    }
}

impl EnvelopeCodec {
    pub fn new(max_envelope_bytes: u64, max_depth: usize) -> Self {
        Self {
            max_envelope_bytes,
            max_depth,
        }
    }

    pub fn max_envelope_bytes(&self) -> u64 {
        self.max_envelope_bytes
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn options(&self) -> impl Options {
        let body_limit = self
            .max_envelope_bytes
            .saturating_sub(WireFormat::HEADER_SIZE as u64);
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .with_limit(body_limit)
    }

    /// Encode `message` for the actor at `path` on the destination node
    ///
    /// Local refs whose uri carries no node are qualified with `origin` so the
    /// receiver can route replies back; without an origin such refs cannot be
    /// encoded.
    pub fn encode(&self, path: &Uri, message: &Message, origin: Option<&NodeId>) -> Result<Bytes> {
        if message.depth() > self.max_depth {
            return Err(RemotingError::encode(format!(
                "Message nesting {} exceeds maximum {}",
                message.depth(),
                self.max_depth
            )));
        }

        let envelope = WireEnvelope {
            path: path.local_path(),
            payload: to_wire(message, origin)?,
        };

        let body = self
            .options()
            .serialize(&envelope)
            .map_err(|e| RemotingError::encode_with_source("Envelope serialization failed", e))?;

        let mut frame = BytesMut::with_capacity(WireFormat::HEADER_SIZE + body.len());
        frame.put_slice(WireFormat::MAGIC);
        frame.put_u8(WireFormat::VERSION);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }

    /// Decode a frame, rehydrating every ref marker through `lookup`
    pub fn decode<F>(&self, data: &[u8], mut lookup: F) -> Result<Envelope>
    where
        F: FnMut(Uri) -> Result<Ref>,
    {
        if data.len() as u64 > self.max_envelope_bytes {
            return Err(RemotingError::corrupt(format!(
                "Envelope size {} exceeds maximum {}",
                data.len(),
                self.max_envelope_bytes
            )));
        }
        if data.len() < WireFormat::HEADER_SIZE {
            return Err(RemotingError::corrupt("Envelope too short"));
        }
        if &data[..4] != WireFormat::MAGIC {
            return Err(RemotingError::corrupt("Invalid magic bytes"));
        }
        if data[4] != WireFormat::VERSION {
            return Err(RemotingError::corrupt(format!(
                "Unsupported envelope version: {}",
                data[4]
            )));
        }

        let envelope = self
            .options()
            .deserialize_seed(
                EnvelopeSeed {
                    depth_left: self.max_depth,
                },
                &data[WireFormat::HEADER_SIZE..],
            )
            .map_err(|e| {
                RemotingError::corrupt_with_source("Envelope deserialization failed", e)
            })?;

        let path = Uri::parse(&envelope.path)
            .map_err(|e| RemotingError::corrupt_with_source("Invalid destination path", e))?;
        if path.node().is_some() {
            return Err(RemotingError::corrupt(format!(
                "Destination {} must be a local path",
                envelope.path
            )));
        }

        let message = from_wire(envelope.payload, &mut lookup)?;
        Ok(Envelope { path, message })
    }
}

fn to_wire(message: &Message, origin: Option<&NodeId>) -> Result<WireValue> {
    let list = |items: &[Message]| -> Result<Vec<WireValue>> {
        items.iter().map(|item| to_wire(item, origin)).collect()
    };

    Ok(match message {
        Message::Unit => WireValue::Unit,
        Message::Bool(b) => WireValue::Bool(*b),
        Message::Int(i) => WireValue::Int(*i),
        Message::Float(f) => WireValue::Float(*f),
        Message::Str(s) => WireValue::Str(s.clone()),
        Message::Bytes(b) => WireValue::Bytes(b.clone()),
        Message::Tuple(items) => WireValue::Tuple(list(items.as_slice())?),
        Message::List(items) => WireValue::List(list(items.as_slice())?),
        Message::Map(entries) => WireValue::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_wire(v, origin)?)))
                .collect::<Result<_>>()?,
        ),
        Message::Ref(r) => WireValue::Ref(ref_marker(r, origin)?),
    })
}

fn ref_marker(r: &Ref, origin: Option<&NodeId>) -> Result<WireRef> {
    let uri = match (r.uri().node(), r.is_local()) {
        (Some(_), _) => r.uri().clone(),
        (None, true) => match origin {
            Some(nid) => r.uri().with_node(Some(nid.clone())),
            None => {
                return Err(RemotingError::encode(format!(
                    "Local ref {} cannot be sent from a node without an id",
                    r.uri()
                )))
            }
        },
        (None, false) => {
            return Err(RemotingError::encode(format!(
                "Remote ref {} has no node",
                r.uri()
            )))
        }
    };
    if !uri.is_absolute() {
        return Err(RemotingError::encode(format!(
            "Relative ref {} cannot be sent",
            uri
        )));
    }

    Ok(WireRef {
        uri: uri.to_string(),
        is_local: r.is_local(),
    })
}

fn from_wire<F>(value: WireValue, lookup: &mut F) -> Result<Message>
where
    F: FnMut(Uri) -> Result<Ref>,
{
    let list = |items: Vec<WireValue>, lookup: &mut F| -> Result<Vec<Message>> {
        items.into_iter().map(|item| from_wire(item, lookup)).collect()
    };

    Ok(match value {
        WireValue::Unit => Message::Unit,
        WireValue::Bool(b) => Message::Bool(b),
        WireValue::Int(i) => Message::Int(i),
        WireValue::Float(f) => Message::Float(f),
        WireValue::Str(s) => Message::Str(s),
        WireValue::Bytes(b) => Message::Bytes(b),
        WireValue::Tuple(items) => Message::Tuple(list(items, lookup)?),
        WireValue::List(items) => Message::List(list(items, lookup)?),
        WireValue::Map(entries) => Message::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((k, from_wire(v, lookup)?)))
                .collect::<Result<_>>()?,
        ),
        WireValue::Ref(marker) => {
            let uri = Uri::parse(&marker.uri)
                .map_err(|e| RemotingError::corrupt_with_source("Invalid ref marker", e))?;
            let r = lookup(uri).map_err(|e| {
                RemotingError::corrupt_with_source(format!("Cannot rehydrate {}", marker.uri), e)
            })?;
            Message::Ref(r)
        }
    })
}

const WIRE_VARIANTS: &[&str] = &[
    "Unit", "Bool", "Int", "Float", "Str", "Bytes", "Tuple", "List", "Map", "Ref",
];

#[derive(Deserialize)]
#[serde(variant_identifier)]
enum WireTag {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tuple,
    List,
    Map,
    Ref,
}

/// Reads a [`WireEnvelope`] whose payload may nest `depth_left` levels
struct EnvelopeSeed {
    depth_left: usize,
}

impl<'de> DeserializeSeed<'de> for EnvelopeSeed {
    type Value = WireEnvelope;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_struct("WireEnvelope", &["path", "payload"], self)
    }
}

impl<'de> Visitor<'de> for EnvelopeSeed {
    type Value = WireEnvelope;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an envelope")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let path = seq
            .next_element::<String>()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let payload = seq
            .next_element_seed(ValueSeed {
                depth_left: self.depth_left,
            })?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(WireEnvelope { path, payload })
    }
}

/// Reads one [`WireValue`], failing once nesting runs out
#[derive(Clone, Copy)]
struct ValueSeed {
    depth_left: usize,
}

impl ValueSeed {
    fn children(self) -> ValueSeed {
        ValueSeed {
            depth_left: self.depth_left - 1,
        }
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = WireValue;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        if self.depth_left == 0 {
            return Err(de::Error::custom("message nesting exceeds maximum"));
        }
        deserializer.deserialize_enum("WireValue", WIRE_VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a wire value")
    }

    fn visit_enum<A>(self, data: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (tag, variant) = data.variant::<WireTag>()?;
        Ok(match tag {
            WireTag::Unit => {
                variant.unit_variant()?;
                WireValue::Unit
            }
            WireTag::Bool => WireValue::Bool(variant.newtype_variant()?),
            WireTag::Int => WireValue::Int(variant.newtype_variant()?),
            WireTag::Float => WireValue::Float(variant.newtype_variant()?),
            WireTag::Str => WireValue::Str(variant.newtype_variant()?),
            WireTag::Bytes => WireValue::Bytes(variant.newtype_variant()?),
            WireTag::Tuple => {
                WireValue::Tuple(variant.newtype_variant_seed(ListSeed(self.children()))?)
            }
            WireTag::List => {
                WireValue::List(variant.newtype_variant_seed(ListSeed(self.children()))?)
            }
            WireTag::Map => WireValue::Map(variant.newtype_variant_seed(MapSeed(self.children()))?),
            WireTag::Ref => WireValue::Ref(variant.newtype_variant()?),
        })
    }
}

/// Sequence of values, each read with the wrapped budget
struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<WireValue>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<WireValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of wire values")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        // Length prefixes are attacker controlled
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

/// String-keyed map of values, each read with the wrapped budget
struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = BTreeMap<String, WireValue>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = BTreeMap<String, WireValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of wire values")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = BTreeMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.0)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ProbeCell;

    fn uri(text: &str) -> Uri {
        Uri::parse(text).unwrap()
    }

    fn nid(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    /// Hand-built frame of `levels` single-element tuples around a unit
    fn nested_tuple_frame(levels: usize) -> Vec<u8> {
        let mut frame = WireFormat::MAGIC.to_vec();
        frame.push(WireFormat::VERSION);
        frame.extend_from_slice(&2u64.to_le_bytes());
        frame.extend_from_slice(b"/w");
        for _ in 0..levels {
            frame.extend_from_slice(&6u32.to_le_bytes());
            frame.extend_from_slice(&1u64.to_le_bytes());
        }
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame
    }

    /// Lookup that resolves everything to a dead ref, like a node with no actors
    fn dead_lookup(u: Uri) -> Result<Ref> {
        Ok(Ref::dead(u, None))
    }

    #[test]
    fn test_frame_header() {
        let codec = EnvelopeCodec::default();
        let bytes = codec.encode(&uri("B/worker"), &Message::from("ping"), None).unwrap();

        assert_eq!(&bytes[..4], WireFormat::MAGIC);
        assert_eq!(bytes[4], WireFormat::VERSION);

        let envelope = codec.decode(&bytes, dead_lookup).unwrap();
        assert_eq!(envelope.path, uri("/worker"));
        assert_eq!(envelope.message, Message::from("ping"));
    }

    #[test]
    fn test_local_refs_are_qualified_with_origin() {
        let codec = EnvelopeCodec::default();
        let probe = ProbeCell::new(uri("/sender"));
        let sender = Ref::local(uri("/sender"), probe);

        let bytes = codec
            .encode(&uri("/worker"), &Message::from(sender.clone()), Some(&nid("A")))
            .unwrap();

        let mut seen = Vec::new();
        codec
            .decode(&bytes, |u| {
                seen.push(u.clone());
                Ok(Ref::dead(u, None))
            })
            .unwrap();
        assert_eq!(seen, vec![uri("A/sender")]);

        let err = codec
            .encode(&uri("/worker"), &Message::from(sender), None)
            .unwrap_err();
        assert!(matches!(err, RemotingError::Encode { .. }));
    }

    #[test]
    fn test_nested_refs_are_rehydrated() {
        let codec = EnvelopeCodec::default();
        let a = Ref::dead(uri("A/x"), None);
        let b = Ref::dead(uri("B/y"), None);
        let mut map = BTreeMap::new();
        map.insert("reply_to".to_string(), Message::from(b.clone()));
        let message = Message::tuple([Message::from(a.clone()), Message::Map(map)]);

        let bytes = codec.encode(&uri("/worker"), &message, None).unwrap();
        let decoded = codec.decode(&bytes, dead_lookup).unwrap().message;

        assert_eq!(decoded, message);
    }

    #[test]
    fn test_lookup_failure_is_corrupt_envelope() {
        let codec = EnvelopeCodec::default();
        let bytes = codec
            .encode(&uri("/worker"), &Message::from(Ref::dead(uri("A/x"), None)), None)
            .unwrap();

        let err = codec
            .decode(&bytes, |u| Err(RemotingError::lookup_failed(u)))
            .unwrap_err();
        assert!(matches!(err, RemotingError::CorruptEnvelope { .. }));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        let codec = EnvelopeCodec::default();
        let good = codec.encode(&uri("/w"), &Message::Int(7), None).unwrap();

        assert!(codec.decode(&[], dead_lookup).is_err());
        assert!(codec.decode(b"ACT", dead_lookup).is_err());

        let mut bad_magic = good.to_vec();
        bad_magic[0] = b'X';
        assert!(codec.decode(&bad_magic, dead_lookup).is_err());

        let mut bad_version = good.to_vec();
        bad_version[4] = 99;
        assert!(codec.decode(&bad_version, dead_lookup).is_err());

        let truncated = &good[..good.len() - 1];
        assert!(codec.decode(truncated, dead_lookup).is_err());

        let mut trailing = good.to_vec();
        trailing.push(0);
        assert!(codec.decode(&trailing, dead_lookup).is_err());

        let mut unknown_variant = good.to_vec();
        // First payload byte after the path is the WireValue tag
        let tag_offset = WireFormat::HEADER_SIZE + 8 + "/w".len();
        unknown_variant[tag_offset] = 0xEE;
        assert!(codec.decode(&unknown_variant, dead_lookup).is_err());
    }

    #[test]
    fn test_limits() {
        let codec = EnvelopeCodec::new(64, 3);

        let deep = Message::List(vec![Message::List(vec![Message::List(vec![Message::Unit])])]);
        assert!(codec.encode(&uri("/w"), &deep, None).is_err());

        let big = Message::Bytes(vec![0u8; 128]);
        assert!(codec.encode(&uri("/w"), &big, None).is_err());

        let ok = codec.encode(&uri("/w"), &Message::Int(1), None).unwrap();
        assert!(ok.len() <= 64);

        let lenient = EnvelopeCodec::new(1024, 8);
        let bytes = lenient.encode(&uri("/w"), &deep, None).unwrap();
        assert!(codec.decode(&bytes, dead_lookup).is_err());
    }

    #[test]
    fn test_deep_nesting_rejected_while_reading() {
        let codec = EnvelopeCodec::default();

        let shallow = codec.decode(&nested_tuple_frame(2), dead_lookup).unwrap();
        assert_eq!(shallow.message, Message::tuple([Message::tuple([Message::Unit])]));

        // Well inside the size limit, far past the nesting limit
        let frame = nested_tuple_frame(300_000);
        assert!(frame.len() as u64 <= codec.max_envelope_bytes());
        let err = codec.decode(&frame, dead_lookup).unwrap_err();
        assert!(matches!(err, RemotingError::CorruptEnvelope { .. }));

        let at_limit = EnvelopeCodec::new(1024, 3);
        assert!(at_limit.decode(&nested_tuple_frame(2), dead_lookup).is_ok());
        assert!(at_limit.decode(&nested_tuple_frame(3), dead_lookup).is_err());
    }
}
