//! 安全随机数生成模块
//!
//! 提供密码学安全的随机数生成功能，用于生成 PIN 盐值、token 序列号后缀、
//! challenge 事务 ID 等数据。

use rand::{Rng, TryRngCore, rngs::OsRng};

use crate::error::{CryptoError, Error, Result};

/// 生成指定长度的随机字节数组
///
/// 使用操作系统提供的密码学安全随机数生成器 (CSPRNG)
///
/// # Example
///
/// ```rust
/// use tokenrs::random::generate_random_bytes;
///
/// let bytes = generate_random_bytes(32).unwrap();
/// assert_eq!(bytes.len(), 32);
/// ```
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))?;
    Ok(bytes)
}

/// 生成指定长度的十六进制随机字符串
///
/// # Arguments
///
/// * `byte_length` - 要生成的字节数（最终字符串长度为字节数的两倍）
///
/// # Example
///
/// ```rust
/// use tokenrs::random::generate_random_hex;
///
/// let hex = generate_random_hex(16).unwrap();
/// assert_eq!(hex.len(), 32); // 16 bytes = 32 hex chars
/// ```
pub fn generate_random_hex(byte_length: usize) -> Result<String> {
    let bytes = generate_random_bytes(byte_length)?;
    Ok(hex_encode(&bytes))
}

/// 生成指定字符数的大写十六进制随机字符串
///
/// 用于序列号的随机后缀，长度可以是奇数
pub fn generate_random_hex_chars(length: usize) -> Result<String> {
    let mut hex = generate_random_hex(length.div_ceil(2))?;
    hex.truncate(length);
    Ok(hex.to_uppercase())
}

/// 生成指定长度的纯数字随机字符串
///
/// 首位不为 0，便于作为数字型事务 ID 使用
///
/// # Example
///
/// ```rust
/// use tokenrs::random::generate_random_digits;
///
/// let id = generate_random_digits(20);
/// assert_eq!(id.len(), 20);
/// assert!(!id.starts_with('0'));
/// ```
pub fn generate_random_digits(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|i| {
            let digit = if i == 0 {
                rng.random_range(1..10u8)
            } else {
                rng.random_range(0..10u8)
            };
            char::from(b'0' + digit)
        })
        .collect()
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 将字节数组编码为十六进制字符串
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 常量时间比较两个字节切片
///
/// 用于防止时序攻击
///
/// # Example
///
/// ```rust
/// use tokenrs::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"755224", b"755224"));
/// assert!(!constant_time_compare(b"755224", b"287082"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
