//! Token 模块
//!
//! 已发放的认证 token 记录及其类型行为。
//!
//! ## 子模块
//!
//! - **otp**: HMAC 动态截断等 OTP 基础算法
//! - **pin**: PIN 的加盐哈希与校验
//! - **types**: 各 token 类型的验证行为与类型注册表
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::token::Token;
//!
//! let token = Token::new("OATH0001", "hotp")
//!     .with_owner("alice", "corp")
//!     .with_realm("default")
//!     .with_otp_key(b"12345678901234567890")
//!     .with_pin("1234")
//!     .unwrap();
//!
//! assert!(token.check_pin("1234"));
//! assert!(token.is_owned_by("alice", "corp"));
//! ```

pub mod otp;
pub mod pin;
mod record;
pub mod types;

pub use record::{
    DEFAULT_COUNTER_WINDOW, DEFAULT_MAX_FAIL_COUNT, DEFAULT_OTP_LENGTH, DEFAULT_SYNC_WINDOW, Token,
    TokenOwner,
};
pub use types::{Capabilities, TokenBehavior, TokenTypeRegistry};
