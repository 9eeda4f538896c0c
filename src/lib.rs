//! # TokenRS
//!
//! 一个多 token 的 OTP 认证引擎。
//!
//! ## 功能特性
//!
//! - **Token 类型**: HOTP、TOTP、静态密码、仅 PIN、Email challenge
//! - **多 token 匹配**: 用一个凭据同时验证用户的所有 token，并选出唯一有效的一个
//! - **Challenge-Response**: 只提交 PIN 时触发 challenge，随后用事务 ID 应答
//! - **失败计数**: 锁定、超时自动清除、认证次数上限与有效期
//! - **自动分配**: 没有 token 的用户可以用 OTP 加目录密码领取一个未分配的 token
//! - **序列号生成**: 按类型前缀生成唯一序列号
//! - **审计日志**: 每次认证恰好一条安全事件
//!
//! ## 认证示例
//!
//! ```rust
//! use std::sync::Arc;
//! use tokenrs::{
//!     AuthOptions, AuthResult, AuthenticationService, EngineConfig, InMemoryTokenStore, Token,
//!     TokenStore, TokenTypeRegistry, UserRef,
//! };
//!
//! let store = Arc::new(InMemoryTokenStore::new());
//! store
//!     .insert(
//!         Token::new("OATH0001", "hotp")
//!             .with_owner("alice", "corp")
//!             .with_otp_key(b"12345678901234567890")
//!             .with_pin("1234")
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let service = AuthenticationService::new(
//!     store,
//!     Arc::new(TokenTypeRegistry::with_defaults()),
//!     EngineConfig::default(),
//! )
//! .unwrap();
//!
//! let alice = UserRef::new("alice", "corp", "default");
//! let result = service
//!     .authenticate(Some(&alice), None, "1234755224", &AuthOptions::default())
//!     .unwrap();
//! assert!(result.is_success());
//! ```
//!
//! ## 审计示例
//!
//! ```rust
//! use std::sync::Arc;
//! use tokenrs::audit::{EventType, InMemoryAuditLogger};
//! use tokenrs::{
//!     AuthOptions, AuthenticationService, EngineConfig, InMemoryTokenStore, Token,
//!     TokenTypeRegistry, UserRef,
//! };
//!
//! let store = InMemoryTokenStore::with_tokens([Token::new("OATH0001", "hotp")
//!     .with_owner("alice", "corp")
//!     .with_otp_key(b"12345678901234567890")]);
//! let audit = InMemoryAuditLogger::new();
//!
//! let service = AuthenticationService::new(
//!     Arc::new(store),
//!     Arc::new(TokenTypeRegistry::with_defaults()),
//!     EngineConfig::default(),
//! )
//! .unwrap()
//! .with_audit_logger(Arc::new(audit.clone()));
//!
//! let alice = UserRef::new("alice", "corp", "default");
//! service
//!     .authenticate(Some(&alice), None, "000000", &AuthOptions::default())
//!     .unwrap();
//!
//! let event = audit.last_event().unwrap();
//! assert_eq!(event.event_type, EventType::TokenAuthFailed);
//! assert_eq!(event.user_id.as_deref(), Some("alice"));
//! ```

pub mod audit;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod password;
pub mod policy;
pub mod random;
pub mod serial;
pub mod store;
pub mod token;

pub use error::{Error, Result};

// ============================================================================
// 认证引擎导出
// ============================================================================

pub use engine::{
    AuditSummary, AuthOptions, AuthReport, AuthResult, AuthenticationService, Challenge,
    ChallengeRegistry, VerificationOutcome,
};

// ============================================================================
// Token 相关导出
// ============================================================================

pub use token::{Token, TokenBehavior, TokenOwner, TokenTypeRegistry};

// ============================================================================
// 存储与协作者导出
// ============================================================================

pub use config::EngineConfig;
pub use directory::{DirectoryAuthenticator, InMemoryDirectory, UserRef};
pub use policy::{PinPolicy, PolicyProvider, RealmPolicy, StaticPolicy};
pub use serial::SerialGenerator;
pub use store::{CounterUpdate, InMemoryTokenStore, TokenStore};

// ============================================================================
// 密码与随机数导出
// ============================================================================

pub use password::{PasswordHasher, hash_password, verify_password};
pub use random::{constant_time_compare, constant_time_compare_str, generate_random_bytes};
