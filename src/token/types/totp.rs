//! TOTP token 类型（RFC 6238）
//!
//! 时间步长由 `timeStep` 设置（默认 30 秒），允许的时间偏差由
//! `timeWindow` 设置（默认 180 秒，前后各一半）。`otp_counter` 记录下一个
//! 可用的时间步，已用过的时间步不会再次通过。

use chrono::{DateTime, Utc};

use super::{Capabilities, TokenBehavior};
use crate::error::Result;
use crate::random::constant_time_compare_str;
use crate::token::Token;
use crate::token::otp::generate_otp;

/// 默认时间步长（秒）
pub const DEFAULT_TIME_STEP: u64 = 30;

/// 默认时间窗口（秒）
pub const DEFAULT_TIME_WINDOW: u64 = 180;

/// TOTP token
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpToken;

impl TotpToken {
    fn time_step(token: &Token) -> u64 {
        token
            .info_u64("timeStep")
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIME_STEP)
    }

    fn find_step(token: &Token, otp: &str, now: DateTime<Utc>, window: u64) -> Result<Option<u64>> {
        let normalized = otp.replace([' ', '-'], "");
        if normalized.len() != token.otp_length {
            return Ok(None);
        }
        let Some(key) = token.otp_key_bytes()? else {
            return Ok(None);
        };

        let step = Self::time_step(token);
        let timestamp = u64::try_from(now.timestamp()).unwrap_or(0);
        let current = timestamp / step;
        let skew = window / step / 2;
        let first = current.saturating_sub(skew).max(token.otp_counter);
        let last = current.saturating_add(skew);
        let algorithm = token.otp_algorithm();

        for counter in first..=last {
            let expected = generate_otp(&key, counter, token.otp_length, algorithm)?;
            if constant_time_compare_str(&normalized, &expected) {
                return Ok(Some(counter));
            }
        }
        Ok(None)
    }
}

impl TokenBehavior for TotpToken {
    fn type_name(&self) -> &'static str {
        "totp"
    }

    fn serial_prefix(&self) -> &'static str {
        "TOTP"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            challenge: false,
            counter: false,
            time: true,
        }
    }

    fn check_otp(&self, token: &Token, otp: &str, now: DateTime<Utc>) -> Result<Option<u64>> {
        let window = token
            .info_u64("timeWindow")
            .unwrap_or(DEFAULT_TIME_WINDOW);
        Self::find_step(token, otp, now, window)
    }

    fn lookup_otp(&self, token: &Token, otp: &str, now: DateTime<Utc>) -> Result<Option<u64>> {
        // 自动分配时放宽到同步窗口（以时间步计）
        let window = token.sync_window.saturating_mul(Self::time_step(token));
        Self::find_step(token, otp, now, window)
    }
}
