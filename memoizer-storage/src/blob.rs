//! Result encoding.
//!
//! Cached results are JSON values, but plain JSON drops two things serde
//! data can carry: non-finite floats and maps keyed by anything other than
//! strings. Results go through [`to_blob`] / [`from_blob`], which keep both:
//!
//! - finite numbers, strings, booleans, unit and sequences map to their JSON
//!   counterparts; enums are externally tagged
//! - a non-finite float becomes `{"$float": "NaN" | "inf" | "-inf"}`
//! - a map whose keys all encode as strings becomes a JSON object; any other
//!   map becomes `{"$map": [[key, value], ...]}`
//! - object keys starting with `$` get a second `$`, so data keys never look
//!   like one of the two tags

use std::fmt;

use memoizer_core::{CacheError, MemoError, MemoResult};
use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor};
use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

use crate::cache::CachedResult;

const FLOAT_TAG: &str = "$float";
const MAP_TAG: &str = "$map";

/// Encode a result for storage.
pub fn to_blob<T: Serialize + ?Sized>(value: &T) -> MemoResult<CachedResult> {
    value.serialize(BlobSerializer).map_err(serialization)
}

/// Decode a stored result into `T`.
pub fn from_blob<T: DeserializeOwned>(blob: CachedResult) -> MemoResult<T> {
    T::deserialize(BlobDeserializer(blob)).map_err(serialization)
}

fn serialization(error: BlobError) -> MemoError {
    CacheError::Serialization { reason: error.0 }.into()
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BlobError(String);

impl BlobError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl ser::Error for BlobError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

impl de::Error for BlobError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn escape_key(key: String) -> String {
    if key.starts_with('$') {
        format!("${}", key)
    } else {
        key
    }
}

fn unescape_key(key: String) -> String {
    match key.strip_prefix("$$") {
        Some(rest) => format!("${}", rest),
        None => key,
    }
}

fn tagged(tag: String, content: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag, content);
    Value::Object(map)
}

fn float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None => {
            let text = if v.is_nan() {
                "NaN"
            } else if v > 0.0 {
                "inf"
            } else {
                "-inf"
            };
            tagged(FLOAT_TAG.to_string(), Value::String(text.to_string()))
        }
    }
}

fn parse_float(text: &str) -> Result<f64, BlobError> {
    match text {
        "NaN" => Ok(f64::NAN),
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        other => Err(BlobError::new(format!("unknown float tag {:?}", other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// SERIALIZER
// ============================================================================

struct BlobSerializer;

impl ser::Serializer for BlobSerializer {
    type Ok = Value;
    type Error = BlobError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = TupleVariantBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = StructVariantBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, BlobError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, BlobError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, BlobError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, BlobError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, BlobError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, BlobError> {
        if let Ok(v) = i64::try_from(v) {
            return self.serialize_i64(v);
        }
        match u64::try_from(v) {
            Ok(v) => self.serialize_u64(v),
            Err(_) => Err(BlobError::new(format!("{} does not fit in 64 bits", v))),
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Value, BlobError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, BlobError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, BlobError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, BlobError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, BlobError> {
        match u64::try_from(v) {
            Ok(v) => self.serialize_u64(v),
            Err(_) => Err(BlobError::new(format!("{} does not fit in 64 bits", v))),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value, BlobError> {
        Ok(float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, BlobError> {
        Ok(float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, BlobError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, BlobError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, BlobError> {
        Ok(Value::Array(
            v.iter().map(|b| Value::Number(u64::from(*b).into())).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value, BlobError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, BlobError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, BlobError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, BlobError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, BlobError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, BlobError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, BlobError> {
        Ok(tagged(
            escape_key(variant.to_string()),
            value.serialize(BlobSerializer)?,
        ))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, BlobError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, BlobError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, BlobError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantBuilder, BlobError> {
        Ok(TupleVariantBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, BlobError> {
        Ok(MapBuilder {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<StructBuilder, BlobError> {
        Ok(StructBuilder { fields: Map::new() })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructVariantBuilder, BlobError> {
        Ok(StructVariantBuilder {
            variant,
            fields: Map::new(),
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), BlobError> {
        self.items.push(value.serialize(BlobSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, BlobError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), BlobError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, BlobError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), BlobError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, BlobError> {
        ser::SerializeSeq::end(self)
    }
}

struct TupleVariantBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for TupleVariantBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), BlobError> {
        self.items.push(value.serialize(BlobSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, BlobError> {
        Ok(tagged(
            escape_key(self.variant.to_string()),
            Value::Array(self.items),
        ))
    }
}

struct MapBuilder {
    entries: Vec<(Value, Value)>,
    pending_key: Option<Value>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), BlobError> {
        self.pending_key = Some(key.serialize(BlobSerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), BlobError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| BlobError::new("map value serialized before its key"))?;
        self.entries.push((key, value.serialize(BlobSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, BlobError> {
        if self.entries.iter().all(|(key, _)| key.is_string()) {
            let mut map = Map::new();
            for (key, value) in self.entries {
                if let Value::String(key) = key {
                    map.insert(escape_key(key), value);
                }
            }
            return Ok(Value::Object(map));
        }
        let pairs = self
            .entries
            .into_iter()
            .map(|(key, value)| Value::Array(vec![key, value]))
            .collect();
        Ok(tagged(MAP_TAG.to_string(), Value::Array(pairs)))
    }
}

struct StructBuilder {
    fields: Map<String, Value>,
}

impl ser::SerializeStruct for StructBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), BlobError> {
        self.fields
            .insert(escape_key(key.to_string()), value.serialize(BlobSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, BlobError> {
        Ok(Value::Object(self.fields))
    }
}

struct StructVariantBuilder {
    variant: &'static str,
    fields: Map<String, Value>,
}

impl ser::SerializeStructVariant for StructVariantBuilder {
    type Ok = Value;
    type Error = BlobError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), BlobError> {
        self.fields
            .insert(escape_key(key.to_string()), value.serialize(BlobSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, BlobError> {
        Ok(tagged(
            escape_key(self.variant.to_string()),
            Value::Object(self.fields),
        ))
    }
}

// ============================================================================
// DESERIALIZER
// ============================================================================

struct BlobDeserializer(Value);

enum Object {
    Float(f64),
    Pairs(Vec<Value>),
    Plain(Map<String, Value>),
}

fn classify(mut map: Map<String, Value>) -> Result<Object, BlobError> {
    if map.len() == 1 {
        if let Some(Value::String(text)) = map.get(FLOAT_TAG) {
            return parse_float(text).map(Object::Float);
        }
        if matches!(map.get(MAP_TAG), Some(Value::Array(_))) {
            if let Some(Value::Array(pairs)) = map.remove(MAP_TAG) {
                return Ok(Object::Pairs(pairs));
            }
        }
    }
    Ok(Object::Plain(map))
}

impl<'de> de::Deserializer<'de> for BlobDeserializer {
    type Error = BlobError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BlobError> {
        match self.0 {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else {
                    match n.as_f64() {
                        Some(f) => visitor.visit_f64(f),
                        None => Err(BlobError::new(format!("unsupported number {}", n))),
                    }
                }
            }
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => visitor.visit_seq(SeqReader(items.into_iter())),
            Value::Object(map) => match classify(map)? {
                Object::Float(f) => visitor.visit_f64(f),
                Object::Pairs(pairs) => visitor.visit_map(PairReader {
                    pairs: pairs.into_iter(),
                    value: None,
                }),
                Object::Plain(map) => visitor.visit_map(ObjectReader {
                    entries: map.into_iter(),
                    value: None,
                }),
            },
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BlobError> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(BlobDeserializer(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BlobError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BlobError> {
        match self.0 {
            Value::String(variant) => {
                let unit: de::value::StringDeserializer<BlobError> = variant.into_deserializer();
                visitor.visit_enum(unit)
            }
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some((variant, content)) => visitor.visit_enum(VariantReader {
                    variant: unescape_key(variant),
                    content,
                }),
                None => Err(BlobError::new("empty enum object")),
            },
            other => Err(BlobError::new(format!(
                "expected an enum variant, found {}",
                kind(&other)
            ))),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

struct SeqReader(std::vec::IntoIter<Value>);

impl<'de> de::SeqAccess<'de> for SeqReader {
    type Error = BlobError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, BlobError> {
        match self.0.next() {
            Some(item) => seed.deserialize(BlobDeserializer(item)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

struct PairReader {
    pairs: std::vec::IntoIter<Value>,
    value: Option<Value>,
}

impl<'de> de::MapAccess<'de> for PairReader {
    type Error = BlobError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, BlobError> {
        let Some(pair) = self.pairs.next() else {
            return Ok(None);
        };
        let [key, value] = match pair {
            Value::Array(pair) => <[Value; 2]>::try_from(pair)
                .map_err(|_| BlobError::new("map entry is not a [key, value] pair"))?,
            other => {
                return Err(BlobError::new(format!(
                    "map entry is {}, not a [key, value] pair",
                    kind(&other)
                )))
            }
        };
        self.value = Some(value);
        seed.deserialize(BlobDeserializer(key)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, BlobError> {
        let value = self
            .value
            .take()
            .ok_or_else(|| BlobError::new("map value read before its key"))?;
        seed.deserialize(BlobDeserializer(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs.len())
    }
}

struct ObjectReader {
    entries: serde_json::map::IntoIter,
    value: Option<Value>,
}

impl<'de> de::MapAccess<'de> for ObjectReader {
    type Error = BlobError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, BlobError> {
        let Some((key, value)) = self.entries.next() else {
            return Ok(None);
        };
        self.value = Some(value);
        seed.deserialize(BlobDeserializer(Value::String(unescape_key(key))))
            .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, BlobError> {
        let value = self
            .value
            .take()
            .ok_or_else(|| BlobError::new("object value read before its key"))?;
        seed.deserialize(BlobDeserializer(value))
    }
}

struct VariantReader {
    variant: String,
    content: Value,
}

impl<'de> de::EnumAccess<'de> for VariantReader {
    type Error = BlobError;
    type Variant = BlobDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, BlobDeserializer), BlobError> {
        let variant = seed.deserialize(BlobDeserializer(Value::String(self.variant)))?;
        Ok((variant, BlobDeserializer(self.content)))
    }
}

impl<'de> de::VariantAccess<'de> for BlobDeserializer {
    type Error = BlobError;

    fn unit_variant(self) -> Result<(), BlobError> {
        match self.0 {
            Value::Null => Ok(()),
            other => Err(BlobError::new(format!(
                "unit variant carries {}",
                kind(&other)
            ))),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, BlobError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, BlobError> {
        de::Deserializer::deserialize_seq(self, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BlobError> {
        de::Deserializer::deserialize_map(self, visitor)
    }
}
