//! OTP 基础算法
//!
//! HMAC 动态截断（RFC 4226），供 HOTP/TOTP/Email 等 token 类型共用。
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::token::otp::{OtpAlgorithm, OtpKey, generate_otp};
//!
//! let key = OtpKey::from_bytes(b"12345678901234567890".to_vec());
//! let code = generate_otp(&key.raw, 0, 6, OtpAlgorithm::SHA1).unwrap();
//! assert_eq!(code, "755224");
//! ```

use base32::{Alphabet, decode as base32_decode, encode as base32_encode};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{Error, Result, ValidationError};

/// OTP 哈希算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtpAlgorithm {
    /// SHA-1（默认，最广泛支持）
    #[default]
    SHA1,
    /// SHA-256
    SHA256,
    /// SHA-512
    SHA512,
}

impl OtpAlgorithm {
    /// 获取算法名称
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpAlgorithm::SHA1 => "sha1",
            OtpAlgorithm::SHA256 => "sha256",
            OtpAlgorithm::SHA512 => "sha512",
        }
    }

    /// 从 token 的 `hashlib` 设置解析，未知名称回退到 SHA-1
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(|n| n.to_ascii_lowercase()).as_deref() {
            Some("sha256") => OtpAlgorithm::SHA256,
            Some("sha512") => OtpAlgorithm::SHA512,
            _ => OtpAlgorithm::SHA1,
        }
    }
}

/// OTP 密钥
#[derive(Debug, Clone)]
pub struct OtpKey {
    /// 原始密钥字节
    pub raw: Vec<u8>,

    /// Base32 编码的密钥（用于存储）
    pub base32: String,
}

impl OtpKey {
    /// 从原始字节创建
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let base32 = base32_encode(Alphabet::Rfc4648 { padding: false }, &bytes);
        Self { raw: bytes, base32 }
    }

    /// 从 Base32 字符串创建
    pub fn from_base32(base32: &str) -> Result<Self> {
        let clean = base32.replace([' ', '-', '='], "").to_uppercase();
        let raw = base32_decode(Alphabet::Rfc4648 { padding: false }, &clean).ok_or_else(|| {
            Error::Validation(ValidationError::InvalidOtpKey(
                "invalid base32 secret".to_string(),
            ))
        })?;
        Ok(Self { raw, base32: clean })
    }
}

/// 计算指定计数器的 OTP 值
///
/// `digits` 必须在 1 到 9 之间
pub fn generate_otp(
    secret: &[u8],
    counter: u64,
    digits: usize,
    algorithm: OtpAlgorithm,
) -> Result<String> {
    if !(1..=9).contains(&digits) {
        return Err(Error::validation(format!(
            "otp length must be between 1 and 9, got {}",
            digits
        )));
    }

    let counter_bytes = counter.to_be_bytes();
    let invalid_key =
        |_| Error::Validation(ValidationError::InvalidOtpKey("invalid secret key".to_string()));

    let hash = match algorithm {
        OtpAlgorithm::SHA1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(secret).map_err(invalid_key)?;
            mac.update(&counter_bytes);
            mac.finalize().into_bytes().to_vec()
        }
        OtpAlgorithm::SHA256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(invalid_key)?;
            mac.update(&counter_bytes);
            mac.finalize().into_bytes().to_vec()
        }
        OtpAlgorithm::SHA512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret).map_err(invalid_key)?;
            mac.update(&counter_bytes);
            mac.finalize().into_bytes().to_vec()
        }
    };

    // 动态截断
    let offset = hash.last().map(|b| (b & 0x0f) as usize).unwrap_or(0);
    let window = hash
        .get(offset..offset + 4)
        .ok_or_else(|| Error::internal("hmac output too short"))?;
    let binary = ((window[0] & 0x7f) as u32) << 24
        | (window[1] as u32) << 16
        | (window[2] as u32) << 8
        | (window[3] as u32);

    let modulo = 10u32.pow(digits as u32);
    let code = binary % modulo;

    // 左填充零
    Ok(format!("{:0width$}", code, width = digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_key() -> OtpKey {
        OtpKey::from_bytes(b"12345678901234567890".to_vec())
    }

    // RFC 4226 测试向量
    #[test]
    fn test_rfc4226_test_vectors() {
        let key = rfc_key();
        let expected_codes = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];

        for (counter, expected) in expected_codes.iter().enumerate() {
            let code = generate_otp(&key.raw, counter as u64, 6, OtpAlgorithm::SHA1).unwrap();
            assert_eq!(&code, expected, "Failed at counter {}", counter);
        }
    }

    // RFC 6238 附录 B，T = 59 秒
    #[test]
    fn test_rfc6238_eight_digits() {
        let key = rfc_key();
        let code = generate_otp(&key.raw, 59 / 30, 8, OtpAlgorithm::SHA1).unwrap();
        assert_eq!(code, "94287082");
    }

    #[test]
    fn test_base32_roundtrip_of_rfc_key() {
        let key = rfc_key();
        assert_eq!(key.base32, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");

        let parsed = OtpKey::from_base32("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap();
        assert_eq!(parsed.raw, key.raw);
    }

    #[test]
    fn test_invalid_base32() {
        assert!(OtpKey::from_base32("not base32!").is_err());
    }

    #[test]
    fn test_invalid_digits() {
        let key = rfc_key();
        assert!(generate_otp(&key.raw, 0, 0, OtpAlgorithm::SHA1).is_err());
        assert!(generate_otp(&key.raw, 0, 10, OtpAlgorithm::SHA1).is_err());
    }

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!(OtpAlgorithm::from_name(Some("SHA256")), OtpAlgorithm::SHA256);
        assert_eq!(OtpAlgorithm::from_name(Some("sha512")), OtpAlgorithm::SHA512);
        assert_eq!(OtpAlgorithm::from_name(None), OtpAlgorithm::SHA1);
        assert_eq!(OtpAlgorithm::from_name(Some("md5")), OtpAlgorithm::SHA1);
    }
}
