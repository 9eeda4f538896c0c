//! HOTP token 类型（RFC 4226）
//!
//! ## 特性
//!
//! - 从 `otp_counter` 开始在 `counter_window` 内查找
//! - 支持 `hashlib` 设置（sha1/sha256/sha512）
//! - `challenge_response = true` 时，仅提交 PIN 会触发 challenge

use chrono::{DateTime, Utc};

use super::{Capabilities, TokenBehavior};
use crate::error::Result;
use crate::random::constant_time_compare_str;
use crate::token::Token;
use crate::token::otp::generate_otp;

/// HOTP token
#[derive(Debug, Clone, Copy, Default)]
pub struct HotpToken;

impl TokenBehavior for HotpToken {
    fn type_name(&self) -> &'static str {
        "hotp"
    }

    fn serial_prefix(&self) -> &'static str {
        "OATH"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            challenge: true,
            counter: true,
            time: false,
        }
    }

    fn check_otp(&self, token: &Token, otp: &str, _now: DateTime<Utc>) -> Result<Option<u64>> {
        find_counter(token, otp, token.otp_counter, token.counter_window)
    }

    fn lookup_otp(&self, token: &Token, otp: &str, _now: DateTime<Utc>) -> Result<Option<u64>> {
        find_counter(token, otp, token.otp_counter, token.sync_window)
    }

    fn is_challenge_request(&self, token: &Token, pin_matched: bool) -> bool {
        pin_matched && token.info_value("challenge_response") == Some("true")
    }
}

/// 在 `[start, start + window)` 内查找与 `otp` 匹配的计数器
pub(crate) fn find_counter(
    token: &Token,
    otp: &str,
    start: u64,
    window: u64,
) -> Result<Option<u64>> {
    let normalized = otp.replace([' ', '-'], "");
    if normalized.len() != token.otp_length {
        return Ok(None);
    }

    let Some(key) = token.otp_key_bytes()? else {
        return Ok(None);
    };
    let algorithm = token.otp_algorithm();

    for offset in 0..window {
        let counter = start.saturating_add(offset);
        let expected = generate_otp(&key, counter, token.otp_length, algorithm)?;
        if constant_time_compare_str(&normalized, &expected) {
            return Ok(Some(counter));
        }
    }

    Ok(None)
}
