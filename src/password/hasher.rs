//! Argon2id 密码哈希实现

use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};

use crate::error::{Error, PasswordHashError, Result};
use crate::random::generate_random_bytes;

/// 密码哈希器
///
/// 默认使用 Argon2 推荐参数，可通过 [`PasswordHasher::with_params`] 调整。
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    /// 使用默认参数创建哈希器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 Argon2 参数
    ///
    /// * `memory_kib` - 内存开销（KiB）
    /// * `iterations` - 迭代次数
    /// * `parallelism` - 并行度
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None).map_err(|e| {
            Error::PasswordHash(PasswordHashError::HashFailed(format!(
                "invalid Argon2 params: {}",
                e
            )))
        })?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// 哈希密码，返回 PHC 格式字符串
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt_bytes = generate_random_bytes(16)?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| {
            Error::PasswordHash(PasswordHashError::HashFailed(format!(
                "failed to encode salt: {}",
                e
            )))
        })?;

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| {
                Error::PasswordHash(PasswordHashError::HashFailed(format!(
                    "Argon2 hash failed: {}",
                    e
                )))
            })
    }

    /// 验证密码
    ///
    /// 哈希中记录的参数优先于哈希器自身的参数。
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            Error::PasswordHash(PasswordHashError::InvalidFormat(format!(
                "invalid Argon2 hash: {}",
                e
            )))
        })?;

        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

/// 使用默认参数哈希密码
pub fn hash_password(password: &str) -> Result<String> {
    PasswordHasher::default().hash(password)
}

/// 验证密码是否匹配哈希
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    PasswordHasher::default().verify(password, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("test_password_123").unwrap();

        assert!(hash.starts_with("$argon2id"));
        assert!(hasher.verify("test_password_123", &hash).unwrap());
        assert!(!hasher.verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_salt_is_random() {
        let hasher = fast_hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = fast_hasher().verify("password", "not-a-hash");
        assert!(matches!(
            result,
            Err(Error::PasswordHash(PasswordHashError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_invalid_params() {
        assert!(PasswordHasher::with_params(0, 0, 0).is_err());
    }

    #[test]
    fn test_convenience_functions() {
        let hash = hash_password("my_secure_password").unwrap();
        assert!(verify_password("my_secure_password", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
