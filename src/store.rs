//! Token 存储
//!
//! 引擎通过 [`TokenStore`] 读取 token 记录，并把一次认证产生的所有计数器变更
//! 作为一个批次交给 [`TokenStore::apply`]。批次要么全部生效，要么全部不生效。
//!
//! ## 示例
//!
//! ```rust
//! use chrono::Utc;
//! use tokenrs::store::{CounterUpdate, InMemoryTokenStore, TokenStore};
//! use tokenrs::token::Token;
//!
//! let store = InMemoryTokenStore::new();
//! store.insert(Token::new("OATH0001", "hotp")).unwrap();
//!
//! store
//!     .apply(&[CounterUpdate::ConsumeOtp { serial: "OATH0001".into(), counter: 4 }], Utc::now())
//!     .unwrap();
//!
//! let token = store.find_by_serial("OATH0001").unwrap().unwrap();
//! assert_eq!(token.otp_counter, 5);
//!
//! // 计数器已越过 4，重放同一个值会冲突
//! assert!(store
//!     .apply(&[CounterUpdate::ConsumeOtp { serial: "OATH0001".into(), counter: 4 }], Utc::now())
//!     .is_err());
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result, StorageError};
use crate::token::{Token, TokenOwner};

/// 单个 token 的计数器变更
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterUpdate {
    /// 消费 OTP 计数器（比较并设置）
    ///
    /// 存储中的计数器已越过 `counter` 时整个批次冲突；否则设置
    /// `otp_counter = counter + 1` 并增加认证总次数。
    ConsumeOtp { serial: String, counter: u64 },
    /// 记录一次失败
    RecordFailure { serial: String, count_auth: bool },
    /// 记录一次成功
    RecordSuccess {
        serial: String,
        clear_fail_counter: bool,
    },
}

impl CounterUpdate {
    /// 变更针对的序列号
    pub fn serial(&self) -> &str {
        match self {
            CounterUpdate::ConsumeOtp { serial, .. }
            | CounterUpdate::RecordFailure { serial, .. }
            | CounterUpdate::RecordSuccess { serial, .. } => serial,
        }
    }

    fn apply_to(&self, token: &mut Token, now: DateTime<Utc>) -> Result<()> {
        match self {
            CounterUpdate::ConsumeOtp { serial, counter } => {
                if token.otp_counter > *counter {
                    return Err(Error::conflict(format!(
                        "otp counter of {} already moved past {}",
                        serial, counter
                    )));
                }
                token.consume_otp(*counter);
            }
            CounterUpdate::RecordFailure { count_auth, .. } => {
                token.record_failure(*count_auth, now);
            }
            CounterUpdate::RecordSuccess {
                clear_fail_counter,
                ..
            } => {
                token.record_success(*clear_fail_counter);
            }
        }
        Ok(())
    }
}

/// Token 存储 trait
///
/// 实现必须保证 [`apply`](TokenStore::apply) 与 [`assign`](TokenStore::assign) 的原子性，
/// [`insert`](TokenStore::insert) 对序列号有唯一约束。
pub trait TokenStore: Send + Sync {
    /// 按序列号查找
    fn find_by_serial(&self, serial: &str) -> Result<Option<Token>>;

    /// 查找用户拥有的所有 token
    fn find_by_user(&self, user_id: &str, resolver: &str) -> Result<Vec<Token>>;

    /// 查找 realm 中未分配的 token
    fn find_unassigned_in_realm(&self, realm: &str) -> Result<Vec<Token>>;

    /// 序列号是否已存在
    fn serial_exists(&self, serial: &str) -> Result<bool>;

    /// 以指定前缀开头的 token 数量
    fn count_with_prefix(&self, prefix: &str) -> Result<usize>;

    /// 插入新 token，序列号已存在时返回 `StorageError::AlreadyExists`
    fn insert(&self, token: Token) -> Result<()>;

    /// 保存 token（存在则覆盖）
    fn save(&self, token: &Token) -> Result<()>;

    /// 原子地应用一批计数器变更
    fn apply(&self, updates: &[CounterUpdate], now: DateTime<Utc>) -> Result<()>;

    /// 原子地把未分配的 token 分配给用户
    ///
    /// 设置所有者，清除失败计数，消费 `consumed_counter`，记录一次成功；
    /// `pin` 为 `Some` 时同时设置 PIN。token 已有所有者时返回冲突。
    fn assign(
        &self,
        serial: &str,
        owner: TokenOwner,
        pin: Option<&str>,
        consumed_counter: u64,
    ) -> Result<Token>;
}

// ============================================================================
// InMemoryTokenStore
// ============================================================================

/// 内存 token 存储
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, Token>>,
}

fn lock_poisoned<T>(_: T) -> Error {
    Error::Storage(StorageError::OperationFailed("lock poisoned".into()))
}

impl InMemoryTokenStore {
    /// 创建空的存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用给定 token 创建存储
    pub fn with_tokens(tokens: impl IntoIterator<Item = Token>) -> Self {
        let map = tokens
            .into_iter()
            .map(|t| (t.serial.clone(), t))
            .collect();
        Self {
            tokens: RwLock::new(map),
        }
    }

    /// token 总数
    pub fn len(&self) -> Result<usize> {
        Ok(self.tokens.read().map_err(lock_poisoned)?.len())
    }

    /// 是否为空
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn collect(&self, predicate: impl Fn(&Token) -> bool) -> Result<Vec<Token>> {
        let tokens = self.tokens.read().map_err(lock_poisoned)?;
        let mut found: Vec<Token> = tokens.values().filter(|t| predicate(t)).cloned().collect();
        found.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(found)
    }
}

impl TokenStore for InMemoryTokenStore {
    fn find_by_serial(&self, serial: &str) -> Result<Option<Token>> {
        let tokens = self.tokens.read().map_err(lock_poisoned)?;
        Ok(tokens.get(serial).cloned())
    }

    fn find_by_user(&self, user_id: &str, resolver: &str) -> Result<Vec<Token>> {
        self.collect(|t| t.is_owned_by(user_id, resolver))
    }

    fn find_unassigned_in_realm(&self, realm: &str) -> Result<Vec<Token>> {
        self.collect(|t| !t.is_assigned() && t.in_realm(realm))
    }

    fn serial_exists(&self, serial: &str) -> Result<bool> {
        let tokens = self.tokens.read().map_err(lock_poisoned)?;
        Ok(tokens.contains_key(serial))
    }

    fn count_with_prefix(&self, prefix: &str) -> Result<usize> {
        let tokens = self.tokens.read().map_err(lock_poisoned)?;
        Ok(tokens.keys().filter(|s| s.starts_with(prefix)).count())
    }

    fn insert(&self, token: Token) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(lock_poisoned)?;
        if tokens.contains_key(&token.serial) {
            return Err(Error::Storage(StorageError::AlreadyExists(token.serial)));
        }
        tokens.insert(token.serial.clone(), token);
        Ok(())
    }

    fn save(&self, token: &Token) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(lock_poisoned)?;
        tokens.insert(token.serial.clone(), token.clone());
        Ok(())
    }

    fn apply(&self, updates: &[CounterUpdate], now: DateTime<Utc>) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(lock_poisoned)?;

        // 先在副本上执行全部变更，全部成功后再写回
        let mut staged: HashMap<&str, Token> = HashMap::new();
        for update in updates {
            let serial = update.serial();
            if !staged.contains_key(serial) {
                let token = tokens
                    .get(serial)
                    .cloned()
                    .ok_or_else(|| Error::Storage(StorageError::NotFound(serial.to_string())))?;
                staged.insert(serial, token);
            }
            if let Some(token) = staged.get_mut(serial) {
                update.apply_to(token, now)?;
            }
        }

        for (serial, token) in staged {
            tokens.insert(serial.to_string(), token);
        }
        Ok(())
    }

    fn assign(
        &self,
        serial: &str,
        owner: TokenOwner,
        pin: Option<&str>,
        consumed_counter: u64,
    ) -> Result<Token> {
        let mut tokens = self.tokens.write().map_err(lock_poisoned)?;
        let mut token = tokens
            .get(serial)
            .cloned()
            .ok_or_else(|| Error::Storage(StorageError::NotFound(serial.to_string())))?;

        if token.is_assigned() {
            return Err(Error::conflict(format!("{} is already assigned", serial)));
        }
        if token.otp_counter > consumed_counter {
            return Err(Error::conflict(format!(
                "otp counter of {} already moved past {}",
                serial, consumed_counter
            )));
        }

        if let Some(pin) = pin {
            token.set_pin(pin)?;
        }
        token.owner = Some(owner);
        token.consume_otp(consumed_counter);
        token.record_success(true);

        tokens.insert(serial.to_string(), token.clone());
        Ok(token)
    }
}
