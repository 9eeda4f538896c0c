//! Challenge 注册表
//!
//! 保存已触发但尚未应答的 challenge。同一个 token 同时最多有一个未完成的
//! challenge，新的 challenge 会替换旧的。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result, StorageError};
use crate::random::generate_random_digits;

/// 事务 ID 的长度
pub const TRANSACTION_ID_LENGTH: usize = 20;

/// 一个未完成的 challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// 事务 ID
    pub transaction_id: String,
    /// token 序列号
    pub serial: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// 是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Challenge 注册表
#[derive(Debug)]
pub struct ChallengeRegistry {
    validity: Duration,
    challenges: RwLock<HashMap<String, Challenge>>,
}

fn lock_poisoned<T>(_: T) -> Error {
    Error::Storage(StorageError::OperationFailed("lock poisoned".into()))
}

impl ChallengeRegistry {
    /// 创建注册表，`validity` 为 challenge 有效期
    pub fn new(validity: Duration) -> Self {
        Self {
            validity,
            challenges: RwLock::new(HashMap::new()),
        }
    }

    /// 为 token 创建 challenge，替换该 token 已有的 challenge
    pub fn create(&self, serial: &str, now: DateTime<Utc>) -> Result<Challenge> {
        let expires_at = now.checked_add_signed(self.validity).ok_or_else(|| {
            Error::internal(format!("challenge validity {} is out of range", self.validity))
        })?;

        let mut challenges = self.challenges.write().map_err(lock_poisoned)?;
        challenges.retain(|_, c| c.serial != serial);

        let mut transaction_id = generate_random_digits(TRANSACTION_ID_LENGTH);
        while challenges.contains_key(&transaction_id) {
            transaction_id = generate_random_digits(TRANSACTION_ID_LENGTH);
        }

        let challenge = Challenge {
            transaction_id: transaction_id.clone(),
            serial: serial.to_string(),
            created_at: now,
            expires_at,
        };
        challenges.insert(transaction_id, challenge.clone());
        Ok(challenge)
    }

    /// 按事务 ID 获取
    pub fn get(&self, transaction_id: &str) -> Result<Option<Challenge>> {
        let challenges = self.challenges.read().map_err(lock_poisoned)?;
        Ok(challenges.get(transaction_id).cloned())
    }

    /// 获取 token 的未完成 challenge
    pub fn for_serial(&self, serial: &str) -> Result<Option<Challenge>> {
        let challenges = self.challenges.read().map_err(lock_poisoned)?;
        Ok(challenges.values().find(|c| c.serial == serial).cloned())
    }

    /// 按事务 ID 删除
    pub fn remove(&self, transaction_id: &str) -> Result<Option<Challenge>> {
        let mut challenges = self.challenges.write().map_err(lock_poisoned)?;
        Ok(challenges.remove(transaction_id))
    }

    /// 删除 token 的所有 challenge
    pub fn remove_for_serial(&self, serial: &str) -> Result<usize> {
        let mut challenges = self.challenges.write().map_err(lock_poisoned)?;
        let before = challenges.len();
        challenges.retain(|_, c| c.serial != serial);
        Ok(before - challenges.len())
    }

    /// 清理过期的 challenge，返回清理数量
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut challenges = self.challenges.write().map_err(lock_poisoned)?;
        let before = challenges.len();
        challenges.retain(|_, c| !c.is_expired(now));
        Ok(before - challenges.len())
    }

    /// 未完成的 challenge 数量
    pub fn len(&self) -> Result<usize> {
        Ok(self.challenges.read().map_err(lock_poisoned)?.len())
    }

    /// 是否没有未完成的 challenge
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        Self::new(Duration::seconds(120))
    }
}
