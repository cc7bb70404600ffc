//! JSON and XML object codecs.
//!
//! Both decode leniently: fields the target type does not declare are
//! ignored, which is serde's default.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Short type name used as the wrapping root, e.g. `Offer` for
/// `my_app::model::Offer<u32>`
pub fn root_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Remove `null` members from objects, recursively
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// JSON codec
///
/// With `wrap_root`, `Offer { id: 1 }` encodes as `{"Offer":{"id":1}}`;
/// `unwrap_root` expects that shape on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec {
    pub omit_nulls: bool,
    pub wrap_root: bool,
    pub unwrap_root: bool,
}

impl JsonCodec {
    /// Create a codec with every option off
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `null` members when encoding
    pub fn omit_nulls(mut self, omit: bool) -> Self {
        self.omit_nulls = omit;
        self
    }

    /// Wrap encoded values in, and expect decoded values inside, a single
    /// member named after the type
    pub fn root_value(mut self, enabled: bool) -> Self {
        self.wrap_root = enabled;
        self.unwrap_root = enabled;
        self
    }

    /// Encode a value to JSON bytes
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_value(value)?)?)
    }

    /// Encode a value to a JSON string
    pub fn encode_to_string<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value(value)?)?)
    }

    fn to_value<T: Serialize>(&self, value: &T) -> Result<Value> {
        let mut json = serde_json::to_value(value)?;
        if self.omit_nulls {
            strip_nulls(&mut json);
        }
        if self.wrap_root {
            let mut root = serde_json::Map::new();
            root.insert(root_name::<T>().to_string(), json);
            json = Value::Object(root);
        }
        Ok(json)
    }

    /// Decode JSON bytes into a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        if !self.unwrap_root {
            return Ok(serde_json::from_slice(bytes)?);
        }
        let expected = root_name::<T>();
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) if map.len() == 1 => {
                let (name, inner) = map.into_iter().next().ok_or_else(|| {
                    Error::encoding("empty root object")
                })?;
                if name != expected {
                    return Err(Error::encoding(format!(
                        "root name {:?} does not match expected {:?}",
                        name, expected
                    )));
                }
                Ok(serde_json::from_value(inner)?)
            }
            _ => Err(Error::encoding(format!(
                "expected a single {:?} root member",
                expected
            ))),
        }
    }
}

/// XML codec
///
/// The root element is named after the type unless `root` overrides it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlCodec {
    pub omit_nulls: bool,
    pub root: Option<String>,
}

impl XmlCodec {
    /// Create a codec with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `None` members when encoding
    pub fn omit_nulls(mut self, omit: bool) -> Self {
        self.omit_nulls = omit;
        self
    }

    /// Override the root element name
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Encode a value to an XML string
    pub fn encode_to_string<T: Serialize>(&self, value: &T) -> Result<String> {
        let root = self.root.as_deref().unwrap_or_else(|| root_name::<T>());
        if self.omit_nulls {
            let mut json = serde_json::to_value(value)?;
            strip_nulls(&mut json);
            quick_xml::se::to_string_with_root(root, &json).map_err(Error::encoding)
        } else {
            quick_xml::se::to_string_with_root(root, value).map_err(Error::encoding)
        }
    }

    /// Encode a value to XML bytes
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        self.encode_to_string(value).map(String::into_bytes)
    }

    /// Decode XML bytes into a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(bytes).map_err(Error::encoding)?;
        quick_xml::de::from_str(text).map_err(Error::encoding)
    }
}
