//! 引擎配置
//!
//! ## 示例
//!
//! ```rust
//! use chrono::Duration;
//! use tokenrs::config::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_challenge_validity(Duration::minutes(5))
//!     .with_fail_counter_clear_timeout(Duration::minutes(10));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.challenge_validity(), Duration::minutes(5));
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::token::DEFAULT_MAX_FAIL_COUNT;

/// 时间类设置的上限（十年，秒）
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// 引擎配置
///
/// 时间类设置以秒保存，便于序列化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PIN 在 OTP 之前（`true`）还是之后
    pub prepend_pin: bool,

    /// challenge 有效期（秒）
    pub challenge_validity_secs: i64,

    /// 失败计数清除超时（秒），`None` 表示锁定不会自动变为暂时性
    pub fail_counter_clear_timeout_secs: Option<i64>,

    /// 新序列号的最小长度
    pub serial_min_length: usize,

    /// 生成序列号时的最大重试次数
    pub serial_max_attempts: u32,

    /// 新 token 的最大失败次数
    pub default_max_fail_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prepend_pin: true,
            challenge_validity_secs: 120,
            fail_counter_clear_timeout_secs: None,
            serial_min_length: 8,
            serial_max_attempts: 1000,
            default_max_fail_count: DEFAULT_MAX_FAIL_COUNT,
        }
    }
}

impl EngineConfig {
    /// 创建严格的安全配置
    pub fn strict() -> Self {
        Self {
            challenge_validity_secs: 60,
            fail_counter_clear_timeout_secs: None,
            default_max_fail_count: 5,
            serial_min_length: 12,
            ..Self::default()
        }
    }

    /// 设置 PIN 位置
    pub fn with_prepend_pin(mut self, prepend_pin: bool) -> Self {
        self.prepend_pin = prepend_pin;
        self
    }

    /// 设置 challenge 有效期
    pub fn with_challenge_validity(mut self, validity: Duration) -> Self {
        self.challenge_validity_secs = validity.num_seconds();
        self
    }

    /// 设置失败计数清除超时
    pub fn with_fail_counter_clear_timeout(mut self, timeout: Duration) -> Self {
        self.fail_counter_clear_timeout_secs = Some(timeout.num_seconds());
        self
    }

    /// 设置序列号最小长度
    pub fn with_serial_min_length(mut self, length: usize) -> Self {
        self.serial_min_length = length;
        self
    }

    /// 设置序列号最大重试次数
    pub fn with_serial_max_attempts(mut self, attempts: u32) -> Self {
        self.serial_max_attempts = attempts;
        self
    }

    /// 设置新 token 的最大失败次数
    pub fn with_default_max_fail_count(mut self, max: u32) -> Self {
        self.default_max_fail_count = max;
        self
    }

    /// challenge 有效期，超出范围的值截断到 `[0, MAX_DURATION_SECS]`
    pub fn challenge_validity(&self) -> Duration {
        bounded_seconds(self.challenge_validity_secs)
    }

    /// 失败计数清除超时，超出范围的值截断到 `[0, MAX_DURATION_SECS]`
    pub fn fail_counter_clear_timeout(&self) -> Option<Duration> {
        self.fail_counter_clear_timeout_secs.map(bounded_seconds)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.challenge_validity_secs <= 0 {
            return Err(invalid(
                "challenge_validity_secs",
                "challenge validity must be greater than 0",
            ));
        }
        if self.challenge_validity_secs > MAX_DURATION_SECS {
            return Err(invalid(
                "challenge_validity_secs",
                "challenge validity must not exceed ten years",
            ));
        }
        if let Some(timeout) = self.fail_counter_clear_timeout_secs {
            if timeout <= 0 {
                return Err(invalid(
                    "fail_counter_clear_timeout_secs",
                    "clear timeout must be greater than 0",
                ));
            }
            if timeout > MAX_DURATION_SECS {
                return Err(invalid(
                    "fail_counter_clear_timeout_secs",
                    "clear timeout must not exceed ten years",
                ));
            }
        }
        if self.serial_max_attempts == 0 {
            return Err(invalid(
                "serial_max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.default_max_fail_count == 0 {
            return Err(invalid(
                "default_max_fail_count",
                "max fail count must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn bounded_seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs.clamp(0, MAX_DURATION_SECS)).unwrap_or_else(Duration::zero)
}

fn invalid(key: &str, message: &str) -> Error {
    Error::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    })
}
