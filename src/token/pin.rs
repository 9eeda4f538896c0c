//! Token PIN 哈希
//!
//! PIN 以 `sha256(seed || pin)` 的十六进制形式保存，比较使用常量时间。

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::random::{constant_time_compare_str, generate_random_hex, hex_encode};

/// 生成新的 PIN 盐值
pub fn generate_pin_seed() -> Result<String> {
    generate_random_hex(16)
}

/// 计算 PIN 的哈希值
pub fn hash_pin(pin: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(pin.as_bytes());
    hex_encode(&hasher.finalize())
}

/// 验证 PIN
///
/// `stored` 为 `None` 表示 token 的 PIN 为空，此时只有空 PIN 能通过。
pub fn verify_pin(pin: &str, seed: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) => constant_time_compare_str(&hash_pin(pin, seed), hash),
        None => pin.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pin_depends_on_seed() {
        assert_ne!(hash_pin("1234", "aa"), hash_pin("1234", "bb"));
        assert_eq!(hash_pin("1234", "aa"), hash_pin("1234", "aa"));
    }

    #[test]
    fn test_verify_pin() {
        let seed = generate_pin_seed().unwrap();
        let hash = hash_pin("1234", &seed);

        assert!(verify_pin("1234", &seed, Some(&hash)));
        assert!(!verify_pin("9999", &seed, Some(&hash)));
        assert!(!verify_pin("", &seed, Some(&hash)));
    }

    #[test]
    fn test_empty_pin() {
        assert!(verify_pin("", "seed", None));
        assert!(!verify_pin("1234", "seed", None));
    }
}
