//! 静态密码 token 类型
//!
//! 凭据为 `PIN + 密码`，密码以 OTP 密钥的形式保存，OTP 长度即密码长度。

use chrono::{DateTime, Utc};

use super::{Capabilities, TokenBehavior};
use crate::error::Result;
use crate::random::constant_time_compare;
use crate::token::Token;
use crate::token::otp::OtpKey;

/// 静态密码 token
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordToken;

impl PasswordToken {
    /// 为 token 设置静态密码
    pub fn set_password(token: &mut Token, password: &str) {
        token.otp_key = Some(OtpKey::from_bytes(password.as_bytes().to_vec()).base32);
        token.otp_length = password.chars().count();
    }
}

impl TokenBehavior for PasswordToken {
    fn type_name(&self) -> &'static str {
        "pw"
    }

    fn serial_prefix(&self) -> &'static str {
        "PW"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn check_otp(&self, token: &Token, otp: &str, _now: DateTime<Utc>) -> Result<Option<u64>> {
        let Some(stored) = token.otp_key_bytes()? else {
            return Ok(None);
        };
        if constant_time_compare(otp.as_bytes(), &stored) {
            Ok(Some(token.otp_counter))
        } else {
            Ok(None)
        }
    }
}
