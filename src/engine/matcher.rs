//! 多 token 匹配
//!
//! 用同一个凭据验证用户的所有候选 token，把结果分到有效、PIN 正确但 OTP 错误、
//! PIN 错误、challenge 四个集合中，并为每个 token 生成一条审计条目。
//! 匹配本身不修改任何 token，计数器变更以 [`CounterUpdate`] 的形式返回。

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{debug, warn};

use super::verifier::{TokenVerifier, VerificationOutcome, VerifyContext};
use crate::error::{Error, Result};
use crate::store::CounterUpdate;
use crate::token::Token;

/// 单个 token 的审计条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// 序列号
    pub serial: String,
    /// 类型
    pub token_type: String,
    /// 权重
    pub weight: u32,
    /// 详情
    pub detail: String,
}

/// OTP 有效但 token 不能通过认证的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// 已禁用
    Inactive,
    /// 失败次数达到上限
    Locked,
    /// 认证总次数达到上限
    AuthCountExceeded,
    /// 认证成功次数达到上限
    SuccessCountExceeded,
    /// 不在有效期内
    OutsideValidity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Inactive => write!(f, "token is disabled"),
            RejectReason::Locked => write!(f, "failcounter exceeded"),
            RejectReason::AuthCountExceeded => write!(f, "authentication counter exceeded"),
            RejectReason::SuccessCountExceeded => {
                write!(f, "successful authentication counter exceeded")
            }
            RejectReason::OutsideValidity => write!(f, "outside validity period"),
        }
    }
}

/// token 当前能否通过认证
///
/// 返回 `Ok(transient)`，`transient` 表示锁定已过清除超时。
pub(crate) fn check_live(
    token: &Token,
    now: DateTime<Utc>,
    clear_timeout: Option<Duration>,
) -> std::result::Result<bool, RejectReason> {
    if !token.active {
        return Err(RejectReason::Inactive);
    }
    let transient = token.is_lock_transient(now, clear_timeout);
    if token.is_locked() && !transient {
        return Err(RejectReason::Locked);
    }
    if token.auth_count_exceeded_after_use() {
        return Err(RejectReason::AuthCountExceeded);
    }
    if token.success_count_exceeded() {
        return Err(RejectReason::SuccessCountExceeded);
    }
    if !token.is_within_validity(now) {
        return Err(RejectReason::OutsideValidity);
    }
    Ok(transient)
}

/// 匹配结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// 有效且可以通过认证的 token
    pub valid: Vec<String>,
    /// `valid` 中锁定已过清除超时的 token
    pub transiently_locked: Vec<String>,
    /// PIN 正确但 OTP 错误的 token
    pub pin_matched_otp_wrong: Vec<String>,
    /// PIN 错误的 token
    pub wrong_pin: Vec<String>,
    /// 请求 challenge 的 token
    pub challenge: Vec<String>,
    /// OTP 有效但不能通过认证的 token
    pub rejected: Vec<(String, RejectReason)>,
    /// 审计条目，与参与匹配的 token 一一对应
    pub audit_entries: Vec<AuditEntry>,
    /// 无论最终结果如何都要应用的 OTP 计数器消费
    pub otp_updates: Vec<CounterUpdate>,
}

impl MatchResult {
    /// 参与匹配的 token 数量
    pub fn considered(&self) -> usize {
        self.audit_entries.len()
    }
}

/// 多 token 匹配器
#[derive(Debug, Clone)]
pub struct MultiTokenMatcher {
    verifier: TokenVerifier,
}

impl MultiTokenMatcher {
    /// 创建匹配器
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// token 是否参与匹配
    pub(crate) fn is_enabled(&self, token: &Token, ctx: &VerifyContext<'_>) -> bool {
        if !self.verifier.registry().contains(&token.token_type) {
            return false;
        }
        if let Some(types) = ctx.enabled_types
            && !types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&token.token_type))
        {
            return false;
        }
        ctx.realm.is_none_or(|realm| token.in_realm(realm))
    }

    /// 匹配凭据
    pub fn match_tokens(
        &self,
        tokens: &[Token],
        credential: &str,
        ctx: &VerifyContext<'_>,
    ) -> Result<MatchResult> {
        let mut result = MatchResult::default();

        for token in tokens {
            if !self.is_enabled(token, ctx) {
                debug!(serial = %token.serial, token_type = %token.token_type, "token skipped");
                continue;
            }
            if let Some(deadline) = ctx.deadline
                && Utc::now() > deadline
            {
                return Err(Error::DeadlineExceeded);
            }

            let outcome = match self.verifier.verify(token, credential, ctx) {
                Ok(outcome) => outcome,
                Err(e) if e.is_token_data() => {
                    warn!(serial = %token.serial, error = %e, "token record unusable, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let mut detail = outcome.to_string();
            debug!(serial = %token.serial, outcome = %outcome, "token classified");

            match outcome {
                VerificationOutcome::ChallengeRequested => {
                    result.challenge.push(token.serial.clone());
                }
                VerificationOutcome::WrongUserPassword | VerificationOutcome::WrongPin => {
                    result.wrong_pin.push(token.serial.clone());
                }
                VerificationOutcome::WrongOtp => {
                    result.pin_matched_otp_wrong.push(token.serial.clone());
                }
                VerificationOutcome::Valid { matched_counter } => {
                    result.otp_updates.push(CounterUpdate::ConsumeOtp {
                        serial: token.serial.clone(),
                        counter: matched_counter,
                    });
                    match check_live(token, ctx.now, ctx.fail_counter_clear_timeout) {
                        Ok(transient) => {
                            result.valid.push(token.serial.clone());
                            if transient {
                                result.transiently_locked.push(token.serial.clone());
                            }
                        }
                        Err(reason) => {
                            detail = format!("{}, {}", detail, reason);
                            result.rejected.push((token.serial.clone(), reason));
                        }
                    }
                }
            }

            result.audit_entries.push(AuditEntry {
                serial: token.serial.clone(),
                token_type: token.token_type.clone(),
                weight: outcome.weight(),
                detail,
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenTypeRegistry;
    use std::sync::Arc;

    fn matcher() -> MultiTokenMatcher {
        MultiTokenMatcher::new(TokenVerifier::new(Arc::new(
            TokenTypeRegistry::with_defaults(),
        )))
    }

    fn hotp(serial: &str) -> Token {
        Token::new(serial, "hotp")
            .with_otp_key(b"12345678901234567890")
            .with_pin("1234")
            .unwrap()
            .with_realm("default")
    }

    #[test]
    fn test_buckets() {
        let tokens = vec![
            hotp("A"),
            hotp("B").with_otp_counter(1),
            hotp("C").with_pin("9999").unwrap(),
        ];
        let result = matcher()
            .match_tokens(&tokens, "1234755224", &VerifyContext::new(Utc::now()))
            .unwrap();

        assert_eq!(result.valid, vec!["A".to_string()]);
        assert_eq!(result.pin_matched_otp_wrong, vec!["B".to_string()]);
        assert_eq!(result.wrong_pin, vec!["C".to_string()]);
        assert_eq!(result.considered(), 3);
        assert_eq!(
            result.otp_updates,
            vec![CounterUpdate::ConsumeOtp {
                serial: "A".into(),
                counter: 0
            }]
        );
    }

    #[test]
    fn test_locked_token_is_rejected_but_consumes() {
        let mut token = hotp("A").with_max_fail_count(1);
        token.record_failure(false, Utc::now());

        let result = matcher()
            .match_tokens(&[token], "1234755224", &VerifyContext::new(Utc::now()))
            .unwrap();

        assert!(result.valid.is_empty());
        assert_eq!(result.rejected, vec![("A".to_string(), RejectReason::Locked)]);
        assert_eq!(result.otp_updates.len(), 1);
        assert_eq!(result.audit_entries[0].weight, 30);
        assert!(result.audit_entries[0].detail.contains("failcounter"));
    }

    #[test]
    fn test_transient_lock() {
        let now = Utc::now();
        let mut token = hotp("A").with_max_fail_count(1);
        token.record_failure(false, now - Duration::minutes(10));

        let ctx = VerifyContext::new(now).with_fail_counter_clear_timeout(Some(Duration::minutes(5)));
        let result = matcher().match_tokens(&[token], "1234755224", &ctx).unwrap();

        assert_eq!(result.valid, vec!["A".to_string()]);
        assert_eq!(result.transiently_locked, vec!["A".to_string()]);
    }

    #[test]
    fn test_gate_reasons() {
        let now = Utc::now();
        let tokens = vec![
            hotp("A").with_active(false),
            hotp("B").with_count_auth_max(0),
            hotp("C").with_validity(None, Some(now - Duration::days(1))),
            hotp("D").with_count_auth_success_max(0),
        ];
        let result = matcher()
            .match_tokens(&tokens, "1234755224", &VerifyContext::new(now))
            .unwrap();

        assert!(result.valid.is_empty());
        assert_eq!(
            result.rejected,
            vec![
                ("A".to_string(), RejectReason::Inactive),
                ("B".to_string(), RejectReason::AuthCountExceeded),
                ("C".to_string(), RejectReason::OutsideValidity),
                ("D".to_string(), RejectReason::SuccessCountExceeded),
            ]
        );
        assert!(
            result.audit_entries[3]
                .detail
                .contains("successful authentication counter exceeded")
        );
    }

    #[test]
    fn test_malformed_token_does_not_block_others() {
        // OTP 长度超出范围，生成 OTP 时报错
        let broken = Token::new("B", "hotp")
            .with_otp_key(b"12345678901234567890")
            .with_otp_length(10)
            .with_realm("default");
        let tokens = vec![hotp("A"), broken];

        let result = matcher()
            .match_tokens(&tokens, "1234755224", &VerifyContext::new(Utc::now()))
            .unwrap();

        assert_eq!(result.valid, vec!["A".to_string()]);
        assert_eq!(result.considered(), 1);
    }

    #[test]
    fn test_filters() {
        let tokens = vec![
            hotp("A"),
            Token::new("B", "totp").with_realm("default"),
            hotp("C").with_realm("sales"),
            Token::new("D", "ocra"),
        ];
        let types = vec!["hotp".to_string()];
        let ctx = VerifyContext::new(Utc::now())
            .with_realm("default")
            .with_enabled_types(&types);

        let result = matcher().match_tokens(&tokens, "1234755224", &ctx).unwrap();

        // C 同时属于 default 和 sales
        let considered: Vec<&str> = result
            .audit_entries
            .iter()
            .map(|e| e.serial.as_str())
            .collect();
        assert_eq!(considered, vec!["A", "C"]);
    }

    #[test]
    fn test_match_is_repeatable() {
        let tokens = vec![hotp("A"), hotp("B").with_pin("9999").unwrap()];
        let ctx = VerifyContext::new(Utc::now());
        let matcher = matcher();

        let first = matcher.match_tokens(&tokens, "1234755224", &ctx).unwrap();
        let second = matcher.match_tokens(&tokens, "1234755224", &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_deadline() {
        let ctx = VerifyContext::new(Utc::now()).with_deadline(Utc::now() - Duration::seconds(1));
        let result = matcher().match_tokens(&[hotp("A")], "1234755224", &ctx);
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }
}
