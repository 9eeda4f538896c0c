//! Token 类型
//!
//! 每种 token 类型实现 [`TokenBehavior`]，按类型名称注册到
//! [`TokenTypeRegistry`] 中，由引擎在运行时按 `token_type` 分派。
//!
//! ## 内置类型
//!
//! | 类型 | 说明 | 序列号前缀 |
//! |---|---|---|
//! | `hotp` | 基于计数器的 OTP (RFC 4226) | `OATH` |
//! | `totp` | 基于时间的 OTP (RFC 6238) | `TOTP` |
//! | `pw` | 静态密码 | `PW` |
//! | `spass` | 仅 PIN | `PISP` |
//! | `email` | 先触发 challenge，再用 HOTP 值应答 | `PIEM` |
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::token::types::TokenTypeRegistry;
//!
//! let registry = TokenTypeRegistry::with_defaults();
//! assert!(registry.contains("hotp"));
//! assert_eq!(registry.get("totp").unwrap().serial_prefix(), "TOTP");
//! ```

pub mod email;
pub mod hotp;
pub mod password;
pub mod spass;
pub mod totp;

pub use email::EmailToken;
pub use hotp::HotpToken;
pub use password::PasswordToken;
pub use spass::SimplePassToken;
pub use totp::TotpToken;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::token::Token;

/// Token 类型的能力集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 支持 challenge-response
    pub challenge: bool,
    /// 基于计数器
    pub counter: bool,
    /// 基于时间
    pub time: bool,
}

/// Token 类型的验证行为
pub trait TokenBehavior: Send + Sync + fmt::Debug {
    /// 类型名称（小写）
    fn type_name(&self) -> &'static str;

    /// 新序列号使用的前缀
    fn serial_prefix(&self) -> &'static str;

    /// 能力集合
    fn capabilities(&self) -> Capabilities;

    /// 将凭据拆分为 `(pin, otp)`
    ///
    /// 默认按 token 的 OTP 长度拆分，`prepend_pin` 决定 PIN 在前还是在后。
    fn split(&self, token: &Token, credential: &str, prepend_pin: bool) -> (String, String) {
        split_pin_otp(credential, token.otp_length, prepend_pin)
    }

    /// 检查 OTP 值，返回匹配的计数器
    ///
    /// 实现不得修改 token。
    fn check_otp(&self, token: &Token, otp: &str, now: DateTime<Utc>) -> Result<Option<u64>>;

    /// 在同步窗口内查找 OTP 值（自动分配使用），不消费计数器
    fn lookup_otp(&self, token: &Token, otp: &str, now: DateTime<Utc>) -> Result<Option<u64>> {
        self.check_otp(token, otp, now)
    }

    /// 完整凭据是否应被视为 challenge 请求
    ///
    /// `pin_matched` 表示整个凭据与 token PIN 相符。
    fn is_challenge_request(&self, _token: &Token, _pin_matched: bool) -> bool {
        false
    }
}

/// 按 OTP 长度拆分凭据
///
/// 凭据短于 OTP 长度时，PIN 为空，整个凭据作为 OTP。
pub fn split_pin_otp(credential: &str, otp_length: usize, prepend_pin: bool) -> (String, String) {
    let char_count = credential.chars().count();
    if char_count <= otp_length {
        return (String::new(), credential.to_string());
    }

    let pin_chars = if prepend_pin {
        char_count - otp_length
    } else {
        otp_length
    };
    let boundary = credential
        .char_indices()
        .nth(pin_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(credential.len());
    let (head, tail) = credential.split_at(boundary);

    if prepend_pin {
        (head.to_string(), tail.to_string())
    } else {
        (tail.to_string(), head.to_string())
    }
}

/// Token 类型注册表
///
/// 在启动时显式构造并传入引擎。
#[derive(Clone, Default)]
pub struct TokenTypeRegistry {
    behaviors: BTreeMap<String, Arc<dyn TokenBehavior>>,
}

impl fmt::Debug for TokenTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTypeRegistry")
            .field("types", &self.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TokenTypeRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含所有内置类型的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HotpToken));
        registry.register(Arc::new(TotpToken));
        registry.register(Arc::new(PasswordToken));
        registry.register(Arc::new(SimplePassToken));
        registry.register(Arc::new(EmailToken));
        registry
    }

    /// 注册一个类型，同名类型会被替换
    pub fn register(&mut self, behavior: Arc<dyn TokenBehavior>) {
        self.behaviors
            .insert(behavior.type_name().to_ascii_lowercase(), behavior);
    }

    /// 获取类型
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TokenBehavior>> {
        self.behaviors
            .get(&type_name.to_ascii_lowercase())
            .map(Arc::clone)
    }

    /// 是否包含类型
    pub fn contains(&self, type_name: &str) -> bool {
        self.behaviors.contains_key(&type_name.to_ascii_lowercase())
    }

    /// 所有已注册的类型名称
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prepend_pin() {
        assert_eq!(
            split_pin_otp("1234755224", 6, true),
            ("1234".to_string(), "755224".to_string())
        );
    }

    #[test]
    fn test_split_append_pin() {
        assert_eq!(
            split_pin_otp("7552241234", 6, false),
            ("1234".to_string(), "755224".to_string())
        );
    }

    #[test]
    fn test_split_short_credential() {
        assert_eq!(
            split_pin_otp("1234", 6, true),
            (String::new(), "1234".to_string())
        );
    }

    #[test]
    fn test_split_multibyte_pin() {
        assert_eq!(
            split_pin_otp("密码755224", 6, true),
            ("密码".to_string(), "755224".to_string())
        );
    }

    #[test]
    fn test_registry_defaults() {
        let registry = TokenTypeRegistry::with_defaults();
        let names: Vec<&str> = registry.type_names().collect();
        assert_eq!(names, vec!["email", "hotp", "pw", "spass", "totp"]);
        assert!(registry.contains("HOTP"));
        assert!(!registry.contains("ocra"));
    }

    #[test]
    fn test_registry_is_explicit() {
        let mut registry = TokenTypeRegistry::new();
        assert!(registry.get("hotp").is_none());

        registry.register(Arc::new(HotpToken));
        assert_eq!(registry.get("hotp").unwrap().type_name(), "hotp");
    }
}
