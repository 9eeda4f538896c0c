//! Token 数据记录
//!
//! 一个 [`Token`] 是一个已发放的认证器实例，最多绑定一个用户。
//! 记录本身不包含类型相关的验证逻辑，验证由 [`TokenBehavior`](super::types::TokenBehavior)
//! 按 `token_type` 分派。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::token::otp::{OtpAlgorithm, OtpKey};
use crate::token::pin::{generate_pin_seed, hash_pin, verify_pin};

/// 默认的最大失败次数
pub const DEFAULT_MAX_FAIL_COUNT: u32 = 10;

/// 默认的计数器查找窗口
pub const DEFAULT_COUNTER_WINDOW: u64 = 10;

/// 默认的同步窗口（自动分配时的查找范围）
pub const DEFAULT_SYNC_WINDOW: u64 = 1000;

/// 默认的 OTP 长度
pub const DEFAULT_OTP_LENGTH: usize = 6;

/// Token 所有者
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenOwner {
    /// 用户 ID
    pub user_id: String,
    /// 用户所在的解析器（用户目录）
    pub resolver: String,
}

impl TokenOwner {
    /// 创建新的所有者
    pub fn new(user_id: impl Into<String>, resolver: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            resolver: resolver.into(),
        }
    }
}

/// 已发放的认证 token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// 序列号（唯一）
    pub serial: String,

    /// 类型名称，如 `hotp`、`totp`
    pub token_type: String,

    /// 所有者，未分配的 token 为 `None`
    pub owner: Option<TokenOwner>,

    /// 所属 realm
    #[serde(default)]
    pub realms: BTreeSet<String>,

    /// 是否启用
    pub active: bool,

    /// 失败计数
    pub fail_count: u32,

    /// 最大失败次数，达到后 token 被锁定
    pub max_fail_count: u32,

    /// 认证总次数
    pub count_auth_total: u64,

    /// 认证成功次数
    pub count_auth_success: u64,

    /// 认证总次数上限
    pub count_auth_max: Option<u64>,

    /// 认证成功次数上限
    pub count_auth_success_max: Option<u64>,

    /// 有效期开始
    pub validity_start: Option<DateTime<Utc>>,

    /// 有效期结束
    pub validity_end: Option<DateTime<Utc>>,

    /// 下一个未使用的 OTP 计数器（TOTP 为时间步）
    pub otp_counter: u64,

    /// 认证时的计数器查找窗口
    pub counter_window: u64,

    /// 自动分配时的计数器查找窗口
    pub sync_window: u64,

    /// OTP 长度
    pub otp_length: usize,

    /// PIN 哈希，`None` 表示空 PIN
    pub pin_hash: Option<String>,

    /// PIN 盐值
    pub pin_seed: String,

    /// Base32 编码的 OTP 密钥
    pub otp_key: Option<String>,

    /// 最近一次失败时间
    pub last_failure_at: Option<DateTime<Utc>>,

    /// 类型相关的附加设置
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

impl Token {
    /// 创建新的 token，使用默认设置
    pub fn new(serial: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            token_type: token_type.into().to_ascii_lowercase(),
            owner: None,
            realms: BTreeSet::new(),
            active: true,
            fail_count: 0,
            max_fail_count: DEFAULT_MAX_FAIL_COUNT,
            count_auth_total: 0,
            count_auth_success: 0,
            count_auth_max: None,
            count_auth_success_max: None,
            validity_start: None,
            validity_end: None,
            otp_counter: 0,
            counter_window: DEFAULT_COUNTER_WINDOW,
            sync_window: DEFAULT_SYNC_WINDOW,
            otp_length: DEFAULT_OTP_LENGTH,
            pin_hash: None,
            pin_seed: String::new(),
            otp_key: None,
            last_failure_at: None,
            info: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Builder 方法
    // ========================================================================

    /// 设置所有者
    pub fn with_owner(mut self, user_id: impl Into<String>, resolver: impl Into<String>) -> Self {
        self.owner = Some(TokenOwner::new(user_id, resolver));
        self
    }

    /// 添加 realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realms.insert(realm.into());
        self
    }

    /// 设置 PIN
    pub fn with_pin(mut self, pin: &str) -> Result<Self> {
        self.set_pin(pin)?;
        Ok(self)
    }

    /// 设置 OTP 密钥（原始字节）
    pub fn with_otp_key(mut self, key: &[u8]) -> Self {
        self.otp_key = Some(OtpKey::from_bytes(key.to_vec()).base32);
        self
    }

    /// 设置 OTP 长度
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length;
        self
    }

    /// 设置计数器窗口
    pub fn with_counter_window(mut self, window: u64) -> Self {
        self.counter_window = window;
        self
    }

    /// 设置同步窗口
    pub fn with_sync_window(mut self, window: u64) -> Self {
        self.sync_window = window;
        self
    }

    /// 设置起始计数器
    pub fn with_otp_counter(mut self, counter: u64) -> Self {
        self.otp_counter = counter;
        self
    }

    /// 设置最大失败次数
    pub fn with_max_fail_count(mut self, max: u32) -> Self {
        self.max_fail_count = max;
        self.fail_count = self.fail_count.min(max);
        self
    }

    /// 设置认证总次数上限
    pub fn with_count_auth_max(mut self, max: u64) -> Self {
        self.count_auth_max = Some(max);
        self
    }

    /// 设置认证成功次数上限
    pub fn with_count_auth_success_max(mut self, max: u64) -> Self {
        self.count_auth_success_max = Some(max);
        self
    }

    /// 设置有效期
    pub fn with_validity(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.validity_start = start;
        self.validity_end = end;
        self
    }

    /// 设置启用状态
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// 添加附加设置
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    // ========================================================================
    // PIN
    // ========================================================================

    /// 设置 PIN，空字符串清除 PIN
    pub fn set_pin(&mut self, pin: &str) -> Result<()> {
        if pin.is_empty() {
            self.pin_hash = None;
            self.pin_seed = String::new();
            return Ok(());
        }
        let seed = generate_pin_seed()?;
        self.pin_hash = Some(hash_pin(pin, &seed));
        self.pin_seed = seed;
        Ok(())
    }

    /// 检查 PIN
    pub fn check_pin(&self, pin: &str) -> bool {
        verify_pin(pin, &self.pin_seed, self.pin_hash.as_deref())
    }

    // ========================================================================
    // 查询方法
    // ========================================================================

    /// 是否已分配给用户
    pub fn is_assigned(&self) -> bool {
        self.owner.is_some()
    }

    /// 是否属于指定用户
    pub fn is_owned_by(&self, user_id: &str, resolver: &str) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|o| o.user_id == user_id && o.resolver == resolver)
    }

    /// 是否属于指定 realm
    pub fn in_realm(&self, realm: &str) -> bool {
        self.realms.contains(realm)
    }

    /// 失败次数是否已达上限
    pub fn is_locked(&self) -> bool {
        self.fail_count >= self.max_fail_count
    }

    /// 锁定是否为暂时性的：最近一次失败距今已超过清除超时
    pub fn is_lock_transient(&self, now: DateTime<Utc>, clear_timeout: Option<Duration>) -> bool {
        match (clear_timeout, self.last_failure_at) {
            (Some(timeout), Some(last)) => self.is_locked() && now - last >= timeout,
            _ => false,
        }
    }

    /// 当前时间是否在有效期内
    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        self.validity_start.is_none_or(|start| now >= start)
            && self.validity_end.is_none_or(|end| now <= end)
    }

    /// 再认证一次后是否会超过认证总次数上限
    pub fn auth_count_exceeded_after_use(&self) -> bool {
        self.count_auth_max
            .is_some_and(|max| self.count_auth_total.saturating_add(1) > max)
    }

    /// 认证成功次数是否已达上限
    pub fn success_count_exceeded(&self) -> bool {
        self.count_auth_success_max
            .is_some_and(|max| self.count_auth_success >= max)
    }

    /// 解码 OTP 密钥
    pub fn otp_key_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.otp_key
            .as_deref()
            .map(|k| OtpKey::from_base32(k).map(|key| key.raw))
            .transpose()
    }

    /// 哈希算法（`hashlib` 设置）
    pub fn otp_algorithm(&self) -> OtpAlgorithm {
        OtpAlgorithm::from_name(self.info_value("hashlib"))
    }

    /// 读取附加设置
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info.get(key).map(String::as_str)
    }

    /// 读取数值型附加设置
    pub fn info_u64(&self, key: &str) -> Option<u64> {
        self.info_value(key).and_then(|v| v.trim().parse().ok())
    }

    // ========================================================================
    // 计数器变更（由存储层在事务内调用）
    // ========================================================================

    /// 记录一次失败，失败计数不超过上限
    pub fn record_failure(&mut self, count_auth: bool, now: DateTime<Utc>) {
        if self.fail_count < self.max_fail_count {
            self.fail_count += 1;
        }
        if count_auth {
            self.count_auth_total = self.count_auth_total.saturating_add(1);
        }
        self.last_failure_at = Some(now);
    }

    /// 记录一次成功
    pub fn record_success(&mut self, clear_fail_counter: bool) {
        self.count_auth_success = self.count_auth_success.saturating_add(1);
        if clear_fail_counter {
            self.fail_count = 0;
            self.last_failure_at = None;
        }
    }

    /// 消费一个 OTP 计数器
    pub fn consume_otp(&mut self, counter: u64) {
        self.otp_counter = counter.saturating_add(1);
        self.count_auth_total = self.count_auth_total.saturating_add(1);
    }
}
