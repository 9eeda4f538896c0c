//! 仅 PIN 的 token 类型
//!
//! 整个凭据都是 PIN，OTP 部分始终为空且总是有效。

use chrono::{DateTime, Utc};

use super::{Capabilities, TokenBehavior};
use crate::error::Result;
use crate::token::Token;

/// Simple-pass token
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePassToken;

impl TokenBehavior for SimplePassToken {
    fn type_name(&self) -> &'static str {
        "spass"
    }

    fn serial_prefix(&self) -> &'static str {
        "PISP"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn split(&self, _token: &Token, credential: &str, _prepend_pin: bool) -> (String, String) {
        (credential.to_string(), String::new())
    }

    fn check_otp(&self, token: &Token, otp: &str, _now: DateTime<Utc>) -> Result<Option<u64>> {
        Ok(otp.is_empty().then_some(token.otp_counter))
    }

    // 没有可查找的 OTP，不能参与自动分配
    fn lookup_otp(&self, _token: &Token, _otp: &str, _now: DateTime<Utc>) -> Result<Option<u64>> {
        Ok(None)
    }
}
