//! Model Adapter - 执行上下文内的模型封装
//!
//! 适配器只在执行上下文线程内构建和调用，因此不要求 Send。

use async_trait::async_trait;

use crate::application::ports::RemoteError;
use crate::domain::Value;

/// 模型适配器
#[async_trait(?Send)]
pub trait ModelAdapter {
    /// 加载模型
    async fn initialize(&self) -> Result<(), RemoteError>;

    /// 执行一次推理
    async fn process(&self, input: Value) -> Result<Value, RemoteError>;

    /// 释放资源
    async fn dispose(&self) {}
}

/// 适配器内部错误名
pub const MODEL_ERROR: &str = "ModelError";
pub const INVALID_INPUT_ERROR: &str = "InvalidInputError";
pub const NOT_LOADED_ERROR: &str = "NotLoadedError";

/// 输入字段缺失或类型错误
pub fn invalid_input(field: &str, expected: &str, value: Option<&Value>) -> RemoteError {
    let found = value.map(Value::kind).unwrap_or("nothing");
    RemoteError::new(
        INVALID_INPUT_ERROR,
        format!("Input field '{}' must be {}, got {}", field, expected, found),
    )
}
