//! Email token 类型
//!
//! 提交 PIN 时触发 challenge，OTP 值通过外部渠道发送给用户，
//! 随后的应答按 HOTP 规则校验。发送本身不在引擎内完成。

use chrono::{DateTime, Utc};

use super::hotp::find_counter;
use super::{Capabilities, TokenBehavior};
use crate::error::Result;
use crate::token::Token;

/// Email token
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailToken;

impl TokenBehavior for EmailToken {
    fn type_name(&self) -> &'static str {
        "email"
    }

    fn serial_prefix(&self) -> &'static str {
        "PIEM"
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

    fn is_challenge_request(&self, _token: &Token, pin_matched: bool) -> bool {
        pin_matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_triggers_challenge() {
        let token = Token::new("PIEM0001", "email");
        assert!(EmailToken.is_challenge_request(&token, true));
        assert!(!EmailToken.is_challenge_request(&token, false));
    }

    #[test]
    fn test_answer_is_hotp() {
        let token = Token::new("PIEM0001", "email").with_otp_key(b"12345678901234567890");
        assert_eq!(EmailToken.check_otp(&token, "287082", Utc::now()).unwrap(), Some(1));
    }
}
