//! 密码哈希模块
//!
//! 为用户目录保存的密码提供 Argon2id 哈希和验证。
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::password::{hash_password, verify_password};
//!
//! let hash = hash_password("my_secure_password").unwrap();
//!
//! assert!(verify_password("my_secure_password", &hash).unwrap());
//! assert!(!verify_password("wrong_password", &hash).unwrap());
//! ```

mod hasher;

pub use hasher::{PasswordHasher, hash_password, verify_password};
