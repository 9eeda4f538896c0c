//! 结果判定
//!
//! 把 [`MatchResult`] 转换为最终结论与需要写入的计数器变更，并从审计条目中
//! 选出一条作为本次认证的审计记录。

use super::matcher::{AuditEntry, MatchResult};
use crate::error::{AuthError, Result};
use crate::store::CounterUpdate;

/// 认证结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 唯一有效的 token
    Success(String),
    /// 没有有效的 token
    Failure,
}

/// 判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// 结论
    pub verdict: Verdict,
    /// 结论对应的计数器变更（不含 OTP 消费）
    pub updates: Vec<CounterUpdate>,
}

/// 选出的审计记录
///
/// 最高权重有多个 token 并列时，`serial` 与 `token_type` 为空字符串。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    /// 序列号
    pub serial: String,
    /// 类型
    pub token_type: String,
    /// 权重
    pub weight: u32,
    /// 详情
    pub detail: String,
}

impl AuditSummary {
    /// 序列号与类型是否因并列而被清空
    pub fn is_ambiguous(&self) -> bool {
        self.serial.is_empty()
    }
}

/// 结果判定器
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeResolver;

impl OutcomeResolver {
    /// 创建判定器
    pub fn new() -> Self {
        Self
    }

    /// 判定
    ///
    /// 多个有效 token 时返回 `AuthError::AmbiguousMatch`，不会降级为普通失败。
    pub fn resolve(&self, matched: &MatchResult) -> Result<Resolution> {
        match matched.valid.as_slice() {
            [serial] => Ok(Resolution {
                verdict: Verdict::Success(serial.clone()),
                updates: vec![CounterUpdate::RecordSuccess {
                    serial: serial.clone(),
                    clear_fail_counter: matched.transiently_locked.contains(serial),
                }],
            }),
            [] => {
                // PIN 正确的 token 才是用户想用的；都不正确时退回到 PIN 错误的集合
                let updates = if !matched.pin_matched_otp_wrong.is_empty() {
                    matched
                        .pin_matched_otp_wrong
                        .iter()
                        .map(|serial| CounterUpdate::RecordFailure {
                            serial: serial.clone(),
                            count_auth: true,
                        })
                        .collect()
                } else {
                    matched
                        .wrong_pin
                        .iter()
                        .map(|serial| CounterUpdate::RecordFailure {
                            serial: serial.clone(),
                            count_auth: false,
                        })
                        .collect()
                };
                Ok(Resolution {
                    verdict: Verdict::Failure,
                    updates,
                })
            }
            many => Err(AuthError::AmbiguousMatch {
                serials: many.to_vec(),
            }
            .into()),
        }
    }
}

/// 选出权重最高的审计条目
pub fn select_audit_entry(entries: &[AuditEntry]) -> Option<AuditSummary> {
    let mut sorted: Vec<&AuditEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.weight);

    let top = sorted.last()?;
    let ties = sorted.iter().filter(|e| e.weight == top.weight).count();

    let (serial, token_type) = if ties > 1 {
        (String::new(), String::new())
    } else {
        (top.serial.clone(), top.token_type.clone())
    };

    Some(AuditSummary {
        serial,
        token_type,
        weight: top.weight,
        detail: top.detail.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn entry(serial: &str, weight: u32) -> AuditEntry {
        AuditEntry {
            serial: serial.to_string(),
            token_type: "hotp".to_string(),
            weight,
            detail: format!("detail {}", serial),
        }
    }

    fn serials(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_valid() {
        let matched = MatchResult {
            valid: serials(&["A"]),
            wrong_pin: serials(&["B"]),
            ..Default::default()
        };
        let resolution = OutcomeResolver::new().resolve(&matched).unwrap();

        assert_eq!(resolution.verdict, Verdict::Success("A".into()));
        assert_eq!(
            resolution.updates,
            vec![CounterUpdate::RecordSuccess {
                serial: "A".into(),
                clear_fail_counter: false
            }]
        );
    }

    #[test]
    fn test_transient_lock_is_cleared() {
        let matched = MatchResult {
            valid: serials(&["A"]),
            transiently_locked: serials(&["A"]),
            ..Default::default()
        };
        let resolution = OutcomeResolver::new().resolve(&matched).unwrap();
        assert_eq!(
            resolution.updates,
            vec![CounterUpdate::RecordSuccess {
                serial: "A".into(),
                clear_fail_counter: true
            }]
        );
    }

    #[test]
    fn test_ambiguous() {
        let matched = MatchResult {
            valid: serials(&["A", "B"]),
            ..Default::default()
        };
        let result = OutcomeResolver::new().resolve(&matched);
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::AmbiguousMatch { ref serials })) if serials.len() == 2
        ));
    }

    #[test]
    fn test_failure_prefers_pin_matched() {
        let matched = MatchResult {
            pin_matched_otp_wrong: serials(&["A"]),
            wrong_pin: serials(&["B", "C"]),
            ..Default::default()
        };
        let resolution = OutcomeResolver::new().resolve(&matched).unwrap();

        assert_eq!(resolution.verdict, Verdict::Failure);
        assert_eq!(
            resolution.updates,
            vec![CounterUpdate::RecordFailure {
                serial: "A".into(),
                count_auth: true
            }]
        );
    }

    #[test]
    fn test_failure_falls_back_to_wrong_pin() {
        let matched = MatchResult {
            wrong_pin: serials(&["B", "C"]),
            ..Default::default()
        };
        let resolution = OutcomeResolver::new().resolve(&matched).unwrap();

        assert_eq!(resolution.updates.len(), 2);
        assert!(resolution.updates.iter().all(|u| matches!(
            u,
            CounterUpdate::RecordFailure {
                count_auth: false,
                ..
            }
        )));
    }

    #[test]
    fn test_select_highest_weight() {
        let summary = select_audit_entry(&[entry("A", 15), entry("B", 25), entry("C", 10)]).unwrap();
        assert_eq!(summary.serial, "B");
        assert_eq!(summary.weight, 25);
        assert!(!summary.is_ambiguous());
    }

    #[test]
    fn test_select_blanks_ties() {
        let summary = select_audit_entry(&[entry("A", 25), entry("B", 25), entry("C", 10)]).unwrap();
        assert!(summary.is_ambiguous());
        assert!(summary.token_type.is_empty());
        assert_eq!(summary.weight, 25);
    }

    #[test]
    fn test_select_empty() {
        assert!(select_audit_entry(&[]).is_none());
    }
}
