//! 用户目录
//!
//! 引擎只通过 [`DirectoryAuthenticator`] 检查用户的目录密码：
//! 自动分配时，以及 PIN 策略为 [`PinPolicy::UserStore`](crate::policy::PinPolicy::UserStore) 时。
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::directory::{DirectoryAuthenticator, InMemoryDirectory};
//!
//! let directory = InMemoryDirectory::new();
//! directory.add_user("alice", "corp", "correct horse").unwrap();
//!
//! assert!(directory.check_password("alice", "corp", "correct horse").unwrap());
//! assert!(!directory.check_password("alice", "corp", "battery staple").unwrap());
//! assert!(!directory.check_password("mallory", "corp", "correct horse").unwrap());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result, StorageError};
use crate::password::PasswordHasher;
use crate::token::TokenOwner;

/// 发起认证的用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// 用户 ID
    pub user_id: String,
    /// 用户所在的解析器
    pub resolver: String,
    /// 用户所在的 realm
    pub realm: String,
}

impl UserRef {
    /// 创建用户引用
    pub fn new(
        user_id: impl Into<String>,
        resolver: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resolver: resolver.into(),
            realm: realm.into(),
        }
    }

    /// 转换为 token 所有者
    pub fn as_owner(&self) -> TokenOwner {
        TokenOwner::new(self.user_id.clone(), self.resolver.clone())
    }
}

/// 目录密码检查 trait
pub trait DirectoryAuthenticator: Send + Sync {
    /// 检查用户的目录密码，未知用户返回 `Ok(false)`
    fn check_password(&self, user_id: &str, resolver: &str, password: &str) -> Result<bool>;
}

// ============================================================================
// InMemoryDirectory
// ============================================================================

/// 内存用户目录
///
/// 密码以 Argon2id 哈希保存。
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    hasher: PasswordHasher,
    users: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryDirectory {
    /// 使用默认哈希参数创建目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定的哈希器创建目录
    pub fn with_hasher(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            users: RwLock::default(),
        }
    }

    /// 添加或替换用户
    pub fn add_user(&self, user_id: &str, resolver: &str, password: &str) -> Result<()> {
        let hash = self.hasher.hash(password)?;
        let mut users = self
            .users
            .write()
            .map_err(|_| Error::Storage(StorageError::OperationFailed("lock poisoned".into())))?;
        users.insert((user_id.to_string(), resolver.to_string()), hash);
        Ok(())
    }
}

impl DirectoryAuthenticator for InMemoryDirectory {
    fn check_password(&self, user_id: &str, resolver: &str, password: &str) -> Result<bool> {
        let hash = {
            let users = self.users.read().map_err(|_| {
                Error::Storage(StorageError::OperationFailed("lock poisoned".into()))
            })?;
            users
                .get(&(user_id.to_string(), resolver.to_string()))
                .cloned()
        };

        match hash {
            Some(hash) => self.hasher.verify(password, &hash),
            None => Ok(false),
        }
    }
}
