//! 外部配置存储契约。
//!
//! # 教案式说明
//! - **意图（Why）**：桥接层只通过“按字符串键查找、带字符串默认值”的方式读取两类属性：
//!   扩展属性（选择绑定的 Sink 实例）与请求对象属性（关联上下文的存活时长）。
//! - **契约（What）**：查找失败返回 [`SettingsError`]；属性缺失不是错误，返回调用方给出的默认值。
//! - **实现（How）**：[`MemorySettings`] 提供基于 `parking_lot::RwLock` 的内存实现，供嵌入与测试使用。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::SettingsError;

/// 请求对象属性：关联上下文的存活时长（秒）。
pub const REQUEST_LIFESPAN_ATTRIBUTE: &str = "requestLifeSpan";
/// [`REQUEST_LIFESPAN_ATTRIBUTE`] 的字符串默认值。
pub const DEFAULT_REQUEST_LIFESPAN: &str = "10";
/// 默认存活时长（秒）。
pub const DEFAULT_REQUEST_LIFESPAN_SECS: u64 = 10;

/// 外部配置存储。
pub trait SettingsStore: Send + Sync + 'static {
    /// 读取某个扩展下的属性。
    fn extension_attribute(
        &self,
        extension: &str,
        attribute: &str,
        default: &str,
    ) -> Result<String, SettingsError>;

    /// 读取请求对象的公共属性。
    fn request_object_attribute(
        &self,
        attribute: &str,
        default: &str,
    ) -> Result<String, SettingsError>;
}

/// 内存配置存储。
#[derive(Debug, Default)]
pub struct MemorySettings {
    extensions: RwLock<HashMap<(String, String), String>>,
    request_object: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入扩展属性，返回旧值。
    pub fn set_extension_attribute(
        &self,
        extension: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.extensions
            .write()
            .insert((extension.into(), attribute.into()), value.into())
    }

    /// 写入请求对象属性，返回旧值。
    pub fn set_request_object_attribute(
        &self,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.request_object
            .write()
            .insert(attribute.into(), value.into())
    }

    /// 删除请求对象属性，之后读取回落到默认值。
    pub fn remove_request_object_attribute(&self, attribute: &str) -> Option<String> {
        self.request_object.write().remove(attribute)
    }
}

impl SettingsStore for MemorySettings {
    fn extension_attribute(
        &self,
        extension: &str,
        attribute: &str,
        default: &str,
    ) -> Result<String, SettingsError> {
        let key = (extension.to_owned(), attribute.to_owned());
        Ok(self
            .extensions
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| default.to_owned()))
    }

    fn request_object_attribute(
        &self,
        attribute: &str,
        default: &str,
    ) -> Result<String, SettingsError> {
        Ok(self
            .request_object
            .read()
            .get(attribute)
            .cloned()
            .unwrap_or_else(|| default.to_owned()))
    }
}

/// 解析显示开关：去除首尾空白后与 `"true"` 做大小写不敏感的精确比较，其余一律为 `false`。
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// 读取关联上下文的存活时长。
///
/// 存储读取失败向上传播；值无法解析为非负整数秒时回落到
/// [`DEFAULT_REQUEST_LIFESPAN_SECS`] 并记录告警。
pub fn request_lifespan(settings: &dyn SettingsStore) -> Result<Duration, SettingsError> {
    let raw =
        settings.request_object_attribute(REQUEST_LIFESPAN_ATTRIBUTE, DEFAULT_REQUEST_LIFESPAN)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(err) => {
            warn!(
                attribute = REQUEST_LIFESPAN_ATTRIBUTE,
                value = %raw,
                error = %err,
                fallback_secs = DEFAULT_REQUEST_LIFESPAN_SECS,
                "unparsable request lifespan, using default"
            );
            Ok(Duration::from_secs(DEFAULT_REQUEST_LIFESPAN_SECS))
        }
    }
}
