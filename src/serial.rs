//! 序列号生成
//!
//! 序列号由 `前缀 + 四位序号 + 大写十六进制随机串` 组成，随机串的长度使序列号
//! 至少达到配置的最小长度。生成时向存储查询冲突，冲突则递增序号重试。
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use tokenrs::config::EngineConfig;
//! use tokenrs::serial::SerialGenerator;
//! use tokenrs::store::{InMemoryTokenStore, TokenStore};
//! use tokenrs::token::{Token, TokenTypeRegistry};
//!
//! let store = Arc::new(InMemoryTokenStore::new());
//! let generator = SerialGenerator::new(
//!     store.clone(),
//!     Arc::new(TokenTypeRegistry::with_defaults()),
//!     EngineConfig::default(),
//! );
//!
//! let token = generator
//!     .reserve("OATH", |serial| Ok(Token::new(serial, "hotp")))
//!     .unwrap();
//!
//! assert!(token.serial.starts_with("OATH0001"));
//! assert!(store.serial_exists(&token.serial).unwrap());
//! ```

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{AuthError, Error, Result, StorageError};
use crate::random::generate_random_hex_chars;
use crate::store::TokenStore;
use crate::token::{Token, TokenTypeRegistry};

/// 序号部分的宽度
const SEQUENCE_WIDTH: usize = 4;

/// 随机部分的最小长度
const MIN_RANDOM_CHARS: usize = 4;

/// 丢失 token 替换序列号的前缀
const LOST_PREFIX: &str = "lost";

/// 序列号生成器
pub struct SerialGenerator {
    store: Arc<dyn TokenStore>,
    registry: Arc<TokenTypeRegistry>,
    config: EngineConfig,
}

impl SerialGenerator {
    /// 创建序列号生成器
    pub fn new(
        store: Arc<dyn TokenStore>,
        registry: Arc<TokenTypeRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// token 类型的序列号前缀
    pub fn prefix_for(&self, token_type: &str) -> Result<&'static str> {
        self.registry
            .get(token_type)
            .map(|behavior| behavior.serial_prefix())
            .ok_or_else(|| Error::Auth(AuthError::UnknownTokenType(token_type.to_string())))
    }

    fn candidate(&self, prefix: &str, sequence: usize) -> Result<String> {
        let mut serial = format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH);
        let random_chars = self
            .config
            .serial_min_length
            .saturating_sub(serial.chars().count())
            .max(MIN_RANDOM_CHARS);
        serial.push_str(&generate_random_hex_chars(random_chars)?);
        Ok(serial)
    }

    /// 生成一个存储中不存在的序列号
    ///
    /// `existing_count` 为已有的同前缀 token 数量，序号从 `existing_count + 1` 开始。
    pub fn next_serial(&self, prefix: &str, existing_count: usize) -> Result<String> {
        for attempt in 0..self.config.serial_max_attempts as usize {
            let sequence = existing_count + 1 + attempt;
            let serial = self.candidate(prefix, sequence)?;
            if !self.store.serial_exists(&serial)? {
                return Ok(serial);
            }
            debug!(serial = %serial, "serial collision, trying next sequence");
        }

        warn!(
            prefix = %prefix,
            attempts = self.config.serial_max_attempts,
            "unable to find a free serial"
        );
        Err(Error::Storage(StorageError::AlreadyExists(format!(
            "no free serial for prefix {}",
            prefix
        ))))
    }

    /// 为 token 类型生成序列号
    pub fn serial_for_type(&self, token_type: &str) -> Result<String> {
        let prefix = self.prefix_for(token_type)?;
        let existing = self.store.count_with_prefix(prefix)?;
        self.next_serial(prefix, existing)
    }

    /// 生成序列号并以唯一约束插入 token
    ///
    /// `build` 根据序列号构造 token；插入时序列号已被占用则换下一个序号重试。
    pub fn reserve<F>(&self, prefix: &str, mut build: F) -> Result<Token>
    where
        F: FnMut(String) -> Result<Token>,
    {
        let existing = self.store.count_with_prefix(prefix)?;

        for attempt in 0..self.config.serial_max_attempts as usize {
            let serial = self.next_serial(prefix, existing + attempt)?;
            let token = build(serial)?;
            match self.store.insert(token.clone()) {
                Ok(()) => {
                    debug!(serial = %token.serial, "serial reserved");
                    return Ok(token);
                }
                Err(Error::Storage(StorageError::AlreadyExists(serial))) => {
                    debug!(serial = %serial, "serial taken concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Storage(StorageError::AlreadyExists(format!(
            "no free serial for prefix {}",
            prefix
        ))))
    }

    /// 登记一个新 token
    ///
    /// 按类型前缀预留序列号，token 以配置的最大失败次数创建，再交给 `configure`
    /// 设置密钥、PIN 等。
    pub fn enroll<F>(&self, token_type: &str, mut configure: F) -> Result<Token>
    where
        F: FnMut(Token) -> Result<Token>,
    {
        let prefix = self.prefix_for(token_type)?;
        let max_fail_count = self.config.default_max_fail_count;

        self.reserve(prefix, |serial| {
            configure(Token::new(serial, token_type).with_max_fail_count(max_fail_count))
        })
    }

    /// 丢失 token 的替换序列号
    ///
    /// 形如 `lost<serial>`，已存在时追加数字后缀。
    pub fn lost_token_serial(&self, serial: &str) -> Result<String> {
        let base = format!("{}{}", LOST_PREFIX, serial);
        if !self.store.serial_exists(&base)? {
            return Ok(base);
        }

        for suffix in 1..=self.config.serial_max_attempts {
            let candidate = format!("{}{}", base, suffix);
            if !self.store.serial_exists(&candidate)? {
                return Ok(candidate);
            }
        }

        Err(Error::Storage(StorageError::AlreadyExists(base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;

    fn generator(store: Arc<InMemoryTokenStore>, config: EngineConfig) -> SerialGenerator {
        SerialGenerator::new(store, Arc::new(TokenTypeRegistry::with_defaults()), config)
    }

    #[test]
    fn test_serial_shape() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(store, EngineConfig::default());

        let serial = generator.next_serial("OATH", 0).unwrap();
        assert!(serial.starts_with("OATH0001"));
        assert_eq!(serial.len(), 12);
        assert!(
            serial[8..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_min_length_padding() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(store, EngineConfig::default().with_serial_min_length(20));

        let serial = generator.next_serial("PW", 41).unwrap();
        assert!(serial.starts_with("PW0042"));
        assert_eq!(serial.len(), 20);
    }

    #[test]
    fn test_prefix_for_type() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(store, EngineConfig::default());

        assert_eq!(generator.prefix_for("hotp").unwrap(), "OATH");
        assert_eq!(generator.prefix_for("email").unwrap(), "PIEM");
        assert!(matches!(
            generator.prefix_for("ocra"),
            Err(Error::Auth(AuthError::UnknownTokenType(_)))
        ));
    }

    #[test]
    fn test_serial_for_type_counts_existing() {
        let store = Arc::new(InMemoryTokenStore::with_tokens([
            Token::new("TOTP0001AAAA", "totp"),
            Token::new("TOTP0002BBBB", "totp"),
        ]));
        let generator = generator(store, EngineConfig::default());

        let serial = generator.serial_for_type("totp").unwrap();
        assert!(serial.starts_with("TOTP0003"));
    }

    #[test]
    fn test_reserve_inserts_unique_tokens() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(store.clone(), EngineConfig::default());

        let mut serials = Vec::new();
        for _ in 0..5 {
            let token = generator
                .reserve("OATH", |serial| Ok(Token::new(serial, "hotp")))
                .unwrap();
            serials.push(token.serial);
        }

        serials.sort();
        serials.dedup();
        assert_eq!(serials.len(), 5);
        assert_eq!(store.len().unwrap(), 5);
    }

    #[test]
    fn test_reserve_propagates_build_error() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(store.clone(), EngineConfig::default());

        let result = generator.reserve("OATH", |_| Err(Error::validation("bad key")));
        assert!(result.is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_enroll_uses_type_prefix_and_config() {
        let store = Arc::new(InMemoryTokenStore::new());
        let generator = generator(
            store.clone(),
            EngineConfig::default().with_default_max_fail_count(3),
        );

        let token = generator
            .enroll("totp", |token| token.with_pin("1234"))
            .unwrap();

        assert!(token.serial.starts_with("TOTP0001"));
        assert_eq!(token.max_fail_count, 3);
        assert!(store.find_by_serial(&token.serial).unwrap().unwrap().check_pin("1234"));
    }

    #[test]
    fn test_lost_token_serial() {
        let store = Arc::new(InMemoryTokenStore::with_tokens([Token::new(
            "lostOATH0001",
            "hotp",
        )]));
        let generator = generator(store, EngineConfig::default());

        assert_eq!(generator.lost_token_serial("TOTP0001").unwrap(), "lostTOTP0001");
        assert_eq!(generator.lost_token_serial("OATH0001").unwrap(), "lostOATH00011");
    }
}
