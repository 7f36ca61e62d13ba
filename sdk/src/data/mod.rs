//! Plutus data: the structured values carried as datums and redeemers, and
//! their CBOR encoding.
//!
//! The encoding must match, byte for byte, what the ledger's script evaluator
//! reconstructs from a transaction. A mismatch does not fail here; it fails
//! later as a script rejection. Rules:
//!
//! ```text
//! Constr t fs   t in 0..=6     tag(121 + t) list(fs)
//!               t in 7..=127   tag(1280 + t - 7) list(fs)
//!               otherwise      tag(102) [t, list(fs)]
//! list(xs)      xs empty       0x80
//!               otherwise      0x9f xs.. 0xff
//! Map           definite map
//! Bytes b       len <= 64      definite byte string
//!               otherwise      0x5f (64-byte chunks).. 0xff
//! Integer n     fits CBOR int  major 0 / major 1
//!               otherwise      tag(2) / tag(3) over big-endian magnitude
//! ```

mod json;

use std::fmt;

use minicbor::data::{Int, Tag, Type};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

pub use json::{from_json, to_json};

/// Maximum nesting of constructors, lists and maps.
pub const MAX_DEPTH: usize = 256;

/// Byte strings longer than this are split into chunks.
pub const BYTES_CHUNK_SIZE: usize = 64;

const TAG_POSITIVE_BIGNUM: u64 = 2;
const TAG_NEGATIVE_BIGNUM: u64 = 3;
const TAG_CONSTR_GENERAL: u64 = 102;
const TAG_CONSTR_SMALL: u64 = 121;
const TAG_CONSTR_LARGE: u64 = 1280;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constr {
    pub tag: u64,
    pub fields: Vec<PlutusData>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PlutusData {
    Constr(Constr),
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Integer(BigInt),
    Bytes(Vec<u8>),
}

impl PlutusData {
    pub fn constr(tag: u64, fields: Vec<PlutusData>) -> Self {
        Self::Constr(Constr { tag, fields })
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Byte string holding the UTF-8 encoding of `text`.
    pub fn bytes_from_utf8(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }

    pub fn integer(n: impl Into<BigInt>) -> Self {
        Self::Integer(n.into())
    }

    pub fn as_constr(&self) -> Option<&Constr> {
        match self {
            Self::Constr(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Self::Integer(n) => Some(n),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    pub fn to_hex(&self) -> Result<String, CodecError> {
        to_hex(self)
    }
}

impl fmt::Debug for PlutusData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constr(c) => {
                write!(f, "Constr({}, ", c.tag)?;
                f.debug_list().entries(&c.fields).finish()?;
                f.write_str(")")
            }
            Self::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Bytes(b) => write!(f, "h'{}'", hex::encode(b)),
        }
    }
}

impl From<Vec<u8>> for PlutusData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<i64> for PlutusData {
    fn from(n: i64) -> Self {
        Self::Integer(n.into())
    }
}

impl Serialize for PlutusData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PlutusData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        from_json(&value).map_err(serde::de::Error::custom)
    }
}

type Encoder = minicbor::Encoder<Vec<u8>>;
type Decoder<'b> = minicbor::Decoder<'b>;

/// Encode `data` into its canonical CBOR form.
pub fn encode(data: &PlutusData) -> Result<Vec<u8>, CodecError> {
    let mut enc = Encoder::new(Vec::new());
    encode_into(&mut enc, data, 0)?;
    Ok(enc.into_writer())
}

/// Decode exactly one data item; trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<PlutusData, CodecError> {
    let mut dec = Decoder::new(bytes);
    let data = decode_item(&mut dec, 0)?;
    let trailing = remaining(&dec);
    if trailing > 0 {
        return Err(CodecError::TrailingBytes(trailing));
    }
    Ok(data)
}

pub fn to_hex(data: &PlutusData) -> Result<String, CodecError> {
    encode(data).map(hex::encode)
}

pub fn from_hex(s: &str) -> Result<PlutusData, CodecError> {
    let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    decode(&bytes)
}

fn encode_into(enc: &mut Encoder, data: &PlutusData, depth: usize) -> Result<(), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::DepthExceeded(MAX_DEPTH));
    }
    match data {
        PlutusData::Constr(Constr { tag, fields }) => {
            match *tag {
                0..=6 => {
                    enc.tag(Tag::new(TAG_CONSTR_SMALL + tag))?;
                }
                7..=127 => {
                    enc.tag(Tag::new(TAG_CONSTR_LARGE + tag - 7))?;
                }
                _ => {
                    enc.tag(Tag::new(TAG_CONSTR_GENERAL))?.array(2)?.u64(*tag)?;
                }
            }
            encode_list(enc, fields, depth)?;
        }
        PlutusData::Map(entries) => {
            enc.map(entries.len() as u64)?;
            for (k, v) in entries {
                encode_into(enc, k, depth + 1)?;
                encode_into(enc, v, depth + 1)?;
            }
        }
        PlutusData::List(items) => encode_list(enc, items, depth)?,
        PlutusData::Integer(n) => encode_integer(enc, n)?,
        PlutusData::Bytes(b) => encode_bounded_bytes(enc, b)?,
    }
    Ok(())
}

fn encode_list(enc: &mut Encoder, items: &[PlutusData], depth: usize) -> Result<(), CodecError> {
    if items.is_empty() {
        enc.array(0)?;
        return Ok(());
    }
    enc.begin_array()?;
    for item in items {
        encode_into(enc, item, depth + 1)?;
    }
    enc.end()?;
    Ok(())
}

fn encode_integer(enc: &mut Encoder, n: &BigInt) -> Result<(), CodecError> {
    // Major types 0 and 1 reach down to -2^64.
    if let Some(small) = i128::try_from(n).ok().and_then(|i| Int::try_from(i).ok()) {
        enc.int(small)?;
        return Ok(());
    }
    if n.sign() == Sign::Minus {
        let magnitude = BigInt::from(-1i8) - n;
        enc.tag(Tag::new(TAG_NEGATIVE_BIGNUM))?;
        encode_bounded_bytes(enc, &magnitude.to_bytes_be().1)
    } else {
        enc.tag(Tag::new(TAG_POSITIVE_BIGNUM))?;
        encode_bounded_bytes(enc, &n.to_bytes_be().1)
    }
}

fn encode_bounded_bytes(enc: &mut Encoder, bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.len() <= BYTES_CHUNK_SIZE {
        enc.bytes(bytes)?;
        return Ok(());
    }
    enc.begin_bytes()?;
    for chunk in bytes.chunks(BYTES_CHUNK_SIZE) {
        enc.bytes(chunk)?;
    }
    enc.end()?;
    Ok(())
}

/// Attach the offset of the item being read to a decoder failure.
fn at<T>(offset: usize, result: Result<T, minicbor::decode::Error>) -> Result<T, CodecError> {
    result.map_err(|e| {
        if e.is_end_of_input() {
            CodecError::UnexpectedEof(offset)
        } else {
            CodecError::Cbor(e.to_string())
        }
    })
}

fn unexpected(dec: &Decoder<'_>, offset: usize) -> CodecError {
    CodecError::UnexpectedMajor {
        major: dec.input().get(offset).map_or(0, |b| b >> 5),
        offset,
    }
}

fn remaining(dec: &Decoder<'_>) -> usize {
    dec.input().len().saturating_sub(dec.position())
}

fn to_usize(len: u64) -> Result<usize, CodecError> {
    usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))
}

/// Consumes a break marker if one is next.
fn take_break(dec: &mut Decoder<'_>) -> Result<bool, CodecError> {
    let offset = dec.position();
    if matches!(at(offset, dec.datatype())?, Type::Break) {
        dec.set_position(offset + 1);
        return Ok(true);
    }
    Ok(false)
}

fn decode_item(dec: &mut Decoder<'_>, depth: usize) -> Result<PlutusData, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::DepthExceeded(MAX_DEPTH));
    }
    let offset = dec.position();
    match at(offset, dec.datatype())? {
        Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::Int => {
            let n = at(offset, dec.int())?;
            Ok(PlutusData::Integer(BigInt::from(i128::from(n))))
        }
        Type::Bytes | Type::BytesIndef => decode_bytes(dec).map(PlutusData::Bytes),
        Type::Array | Type::ArrayIndef => decode_list(dec, depth).map(PlutusData::List),
        Type::Map | Type::MapIndef => decode_map(dec, depth).map(PlutusData::Map),
        Type::Tag => {
            let tag = at(offset, dec.tag())?;
            decode_tagged(dec, tag.as_u64(), depth)
        }
        _ => Err(unexpected(dec, offset)),
    }
}

/// A definite or chunked byte string.
fn decode_bytes(dec: &mut Decoder<'_>) -> Result<Vec<u8>, CodecError> {
    let offset = dec.position();
    if !matches!(at(offset, dec.datatype())?, Type::Bytes | Type::BytesIndef) {
        return Err(unexpected(dec, offset));
    }
    let mut out = Vec::new();
    for chunk in at(offset, dec.bytes_iter())? {
        out.extend_from_slice(at(offset, chunk)?);
    }
    Ok(out)
}

fn decode_tagged(dec: &mut Decoder<'_>, tag: u64, depth: usize) -> Result<PlutusData, CodecError> {
    match tag {
        TAG_POSITIVE_BIGNUM | TAG_NEGATIVE_BIGNUM => {
            let magnitude = BigInt::from_bytes_be(Sign::Plus, &decode_bytes(dec)?);
            Ok(PlutusData::Integer(if tag == TAG_POSITIVE_BIGNUM {
                magnitude
            } else {
                BigInt::from(-1i8) - magnitude
            }))
        }
        121..=127 => Ok(PlutusData::constr(
            tag - TAG_CONSTR_SMALL,
            decode_fields(dec, depth)?,
        )),
        1280..=1400 => Ok(PlutusData::constr(
            tag - TAG_CONSTR_LARGE + 7,
            decode_fields(dec, depth)?,
        )),
        TAG_CONSTR_GENERAL => {
            let offset = dec.position();
            if !matches!(at(offset, dec.datatype())?, Type::Array)
                || at(offset, dec.array())? != Some(2)
            {
                return Err(unexpected(dec, offset));
            }
            let offset = dec.position();
            if !matches!(
                at(offset, dec.datatype())?,
                Type::U8 | Type::U16 | Type::U32 | Type::U64
            ) {
                return Err(unexpected(dec, offset));
            }
            let constr_tag = at(offset, dec.u64())?;
            Ok(PlutusData::constr(constr_tag, decode_fields(dec, depth)?))
        }
        other => Err(CodecError::UnsupportedTag(other)),
    }
}

fn decode_fields(dec: &mut Decoder<'_>, depth: usize) -> Result<Vec<PlutusData>, CodecError> {
    let offset = dec.position();
    match at(offset, dec.datatype())? {
        Type::Array | Type::ArrayIndef => decode_list(dec, depth),
        _ => Err(unexpected(dec, offset)),
    }
}

fn decode_list(dec: &mut Decoder<'_>, depth: usize) -> Result<Vec<PlutusData>, CodecError> {
    let offset = dec.position();
    match at(offset, dec.array())? {
        Some(len) => {
            let len = to_usize(len)?;
            // Every item takes at least one byte.
            let mut items = Vec::with_capacity(len.min(remaining(dec)));
            for _ in 0..len {
                items.push(decode_item(dec, depth + 1)?);
            }
            Ok(items)
        }
        None => {
            let mut items = Vec::new();
            while !take_break(dec)? {
                items.push(decode_item(dec, depth + 1)?);
            }
            Ok(items)
        }
    }
}

fn decode_map(
    dec: &mut Decoder<'_>,
    depth: usize,
) -> Result<Vec<(PlutusData, PlutusData)>, CodecError> {
    let offset = dec.position();
    let mut entries = Vec::new();
    match at(offset, dec.map())? {
        Some(len) => {
            let len = to_usize(len)?;
            entries.reserve(len.min(remaining(dec) / 2));
            for _ in 0..len {
                let k = decode_item(dec, depth + 1)?;
                let v = decode_item(dec, depth + 1)?;
                entries.push((k, v));
            }
        }
        None => {
            while !take_break(dec)? {
                let k = decode_item(dec, depth + 1)?;
                let v = decode_item(dec, depth + 1)?;
                entries.push((k, v));
            }
        }
    }
    Ok(entries)
}
