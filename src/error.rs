//! 统一错误类型模块
//!
//! 提供 tokenrs 库中所有操作的错误类型定义。

use thiserror::Error;

/// tokenrs 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// tokenrs 库的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 认证判定错误
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// 密码哈希错误
    #[error("Password hash error: {0}")]
    PasswordHash(#[from] PasswordHashError),

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 加密错误
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// 调用方给定的截止时间已过
    #[error("deadline exceeded before all tokens were checked")]
    DeadlineExceeded,

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 创建一个内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// 创建一个验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Custom(msg.into()))
    }

    /// 创建一个存储冲突错误
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Storage(StorageError::Conflict(msg.into()))
    }

    /// 是否是认证层面的判定错误（而非传输/存储错误）
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// 是否由单个 token 记录的数据引起（密钥、OTP 长度等），只影响该 token
    pub fn is_token_data(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Crypto(_))
    }
}

/// 认证判定相关错误
///
/// `AmbiguousMatch` 与 `MultipleChallenges` 表示数据/发放问题，
/// 不能被降级为普通的认证失败。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// 没有找到任何候选 token
    #[error("no token found")]
    NoTokenFound,
    /// 同一凭据匹配了多个有效 token
    #[error("credential matched more than one token: {}", .serials.join(", "))]
    AmbiguousMatch { serials: Vec<String> },
    /// 多个 token 同时请求 challenge
    #[error("more than one token requested a challenge: {}", .serials.join(", "))]
    MultipleChallenges { serials: Vec<String> },
    /// 缺少凭据
    #[error("credential is missing")]
    MissingCredential,
    /// 未注册的 token 类型
    #[error("unknown token type: {0}")]
    UnknownTokenType(String),
}

/// 密码哈希相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHashError {
    /// 哈希生成失败
    #[error("hash generation failed: {0}")]
    HashFailed(String),
    /// 无效的哈希格式
    #[error("invalid hash format: {0}")]
    InvalidFormat(String),
}

/// 验证相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 字段为空
    #[error("field '{0}' cannot be empty")]
    EmptyField(String),
    /// 无效的 OTP 密钥
    #[error("invalid otp key: {0}")]
    InvalidOtpKey(String),
    /// 自定义验证错误
    #[error("{0}")]
    Custom(String),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 缺少必需的配置
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
    /// 无效的配置值
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// 记录未找到
    #[error("not found: {0}")]
    NotFound(String),
    /// 记录已存在
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// 并发修改冲突（比较并递增失败）
    #[error("concurrent modification: {0}")]
    Conflict(String),
    /// 操作失败
    #[error("storage operation failed: {0}")]
    OperationFailed(String),
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// 随机数生成失败
    #[error("random number generation failed: {0}")]
    RngFailed(String),
    /// 密钥无效
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Internal(msg.to_string())
    }
}
