//! 结构化值传输
//!
//! `Value` 与线上格式 `WireValue` 之间的转换。基本类型、二进制、序列和映射逐项转换；
//! 其他结构化类型必须实现 `Transferable` 并登记在 `REGISTRY` 中，
//! 编码为 `Tagged { tag, content }`。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{RemoteError, RpcError};
use crate::domain::{DType, Tensor, Value};

/// 序列化错误
#[derive(Debug, Error, PartialEq)]
pub enum SerializationError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Malformed {tag} content: {reason}")]
    Malformed { tag: &'static str, reason: String },
}

impl From<SerializationError> for RpcError {
    fn from(err: SerializationError) -> Self {
        match err {
            SerializationError::UnknownType(_) => RpcError::Configuration(err.to_string()),
            SerializationError::Malformed { .. } => RpcError::Transport(err.to_string()),
        }
    }
}

/// 线上值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    Tagged { tag: String, content: Box<WireValue> },
}

impl WireValue {
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        match self {
            WireValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Float(f) => Some(*f),
            WireValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// 可跨边界传输的结构化类型
pub trait Transferable: Sized {
    const TAG: &'static str;

    fn encode(&self) -> WireValue;

    fn decode(content: WireValue) -> Result<Self, SerializationError>;
}

impl Transferable for Tensor {
    const TAG: &'static str = "Tensor";

    fn encode(&self) -> WireValue {
        let mut content = BTreeMap::new();
        content.insert("dtype".to_string(), WireValue::Text(self.dtype().as_str().to_string()));
        content.insert(
            "dims".to_string(),
            WireValue::List(self.dims().iter().map(|&d| WireValue::Int(d as i64)).collect()),
        );
        content.insert("data".to_string(), WireValue::Bytes(self.to_le_bytes()));
        WireValue::Map(content)
    }

    fn decode(content: WireValue) -> Result<Self, SerializationError> {
        let malformed = |reason: String| SerializationError::Malformed {
            tag: Self::TAG,
            reason,
        };

        let WireValue::Map(mut fields) = content else {
            return Err(malformed("expected a map".to_string()));
        };

        let dtype = match fields.remove("dtype") {
            Some(WireValue::Text(s)) => {
                DType::from_str(&s).ok_or_else(|| malformed(format!("unknown dtype {}", s)))?
            }
            _ => return Err(malformed("missing dtype".to_string())),
        };

        let dims = match fields.remove("dims") {
            Some(WireValue::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    WireValue::Int(d) if d >= 0 => Ok(d as usize),
                    other => Err(malformed(format!("invalid dim {:?}", other))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(malformed("missing dims".to_string())),
        };

        let data = match fields.remove("data") {
            Some(WireValue::Bytes(bytes)) => bytes,
            _ => return Err(malformed("missing data".to_string())),
        };

        Tensor::from_le_bytes(dtype, dims, &data).map_err(|e| malformed(e.to_string()))
    }
}

type Decoder = fn(WireValue) -> Result<Value, SerializationError>;

fn decode_tensor(content: WireValue) -> Result<Value, SerializationError> {
    Tensor::decode(content).map(Value::Tensor)
}

/// 已登记的结构化类型
static REGISTRY: &[(&str, Decoder)] = &[(Tensor::TAG, decode_tensor as Decoder)];

/// 已登记的类型名
pub fn registered_tags() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(tag, _)| *tag)
}

/// 结构化类型的线上形式 `{tag, content}`
pub fn tagged<T: Transferable>(value: &T) -> WireValue {
    WireValue::Tagged {
        tag: T::TAG.to_string(),
        content: Box::new(value.encode()),
    }
}

/// Value → WireValue
pub fn serialize(value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Int(i) => WireValue::Int(*i),
        Value::Float(f) => WireValue::Float(*f),
        Value::Text(s) => WireValue::Text(s.clone()),
        Value::Bytes(b) => WireValue::Bytes(b.clone()),
        Value::List(items) => WireValue::List(items.iter().map(serialize).collect()),
        Value::Map(entries) => WireValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), serialize(v)))
                .collect(),
        ),
        Value::Tensor(t) => tagged(t),
    }
}

/// WireValue → Value，未知标签直接失败
pub fn deserialize(wire: WireValue) -> Result<Value, SerializationError> {
    Ok(match wire {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Int(i) => Value::Int(i),
        WireValue::Float(f) => Value::Float(f),
        WireValue::Text(s) => Value::Text(s),
        WireValue::Bytes(b) => Value::Bytes(b),
        WireValue::List(items) => Value::List(
            items
                .into_iter()
                .map(deserialize)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        WireValue::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| deserialize(v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>, _>>()?,
        ),
        WireValue::Tagged { tag, content } => {
            let decoder = REGISTRY
                .iter()
                .find(|(name, _)| *name == tag)
                .map(|(_, decoder)| *decoder)
                .ok_or(SerializationError::UnknownType(tag))?;
            decoder(*content)?
        }
    })
}

/// RemoteError ↔ WireValue（ERROR 消息负载）
pub fn remote_error_to_wire(err: &RemoteError) -> WireValue {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), WireValue::Text(err.name.clone()));
    fields.insert("message".to_string(), WireValue::Text(err.message.clone()));
    fields.insert(
        "stack".to_string(),
        err.stack
            .as_ref()
            .map(|s| WireValue::Text(s.clone()))
            .unwrap_or(WireValue::Null),
    );
    WireValue::Map(fields)
}

pub fn remote_error_from_wire(wire: &WireValue) -> RemoteError {
    RemoteError {
        name: wire
            .get("name")
            .and_then(WireValue::as_str)
            .unwrap_or("Error")
            .to_string(),
        message: wire
            .get("message")
            .and_then(WireValue::as_str)
            .unwrap_or_default()
            .to_string(),
        stack: wire.get("stack").and_then(WireValue::as_str).map(str::to_string),
    }
}
