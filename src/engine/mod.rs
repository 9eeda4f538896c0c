//! 认证引擎
//!
//! 给定用户（或 token 序列号）和提交的凭据，判定凭据属于哪个 token、是否有效、
//! 是否需要 challenge-response，并写入对应的计数器变更。
//!
//! ## 流程
//!
//! ```text
//! authenticate
//!   -> TokenResolver           查找候选 token
//!   -> AutoAssigner            没有候选且策略允许时
//!   -> MultiTokenMatcher       逐个 TokenVerifier 分类
//!   -> ChallengeRegistry       恰好一个 token 请求 challenge 时
//!   -> OutcomeResolver         得出结论
//!   -> TokenStore::apply       一个原子批次
//!   -> AuditLogger             一条审计事件
//! ```
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use tokenrs::config::EngineConfig;
//! use tokenrs::directory::UserRef;
//! use tokenrs::engine::{AuthOptions, AuthResult, AuthenticationService};
//! use tokenrs::store::{InMemoryTokenStore, TokenStore};
//! use tokenrs::token::{Token, TokenTypeRegistry};
//!
//! let store = Arc::new(InMemoryTokenStore::new());
//! store
//!     .insert(
//!         Token::new("OATH0001", "hotp")
//!             .with_owner("alice", "corp")
//!             .with_otp_key(b"12345678901234567890")
//!             .with_pin("1234")
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let service = AuthenticationService::new(
//!     store.clone(),
//!     Arc::new(TokenTypeRegistry::with_defaults()),
//!     EngineConfig::default(),
//! )
//! .unwrap();
//!
//! let alice = UserRef::new("alice", "corp", "default");
//! let result = service
//!     .authenticate(Some(&alice), None, "1234755224", &AuthOptions::default())
//!     .unwrap();
//! assert_eq!(result, AuthResult::Success { serial: "OATH0001".into() });
//!
//! // 同一个 OTP 值不能再次使用
//! let replay = service
//!     .authenticate(Some(&alice), None, "1234755224", &AuthOptions::default())
//!     .unwrap();
//! assert_eq!(replay, AuthResult::Failure);
//! ```

pub mod autoassign;
pub mod challenge;
pub mod lookup;
pub mod matcher;
pub mod resolver;
pub mod verifier;

pub use autoassign::AutoAssigner;
pub use challenge::{Challenge, ChallengeRegistry};
pub use lookup::TokenResolver;
pub use matcher::{AuditEntry, MatchResult, MultiTokenMatcher, RejectReason};
pub use resolver::{AuditSummary, OutcomeResolver, Resolution, Verdict, select_audit_entry};
pub use verifier::{TokenVerifier, VerificationOutcome, VerifyContext};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditLogger, NoOpAuditLogger, SecurityEvent};
use crate::config::EngineConfig;
use crate::directory::{DirectoryAuthenticator, InMemoryDirectory, UserRef};
use crate::error::{AuthError, Error, Result};
use crate::policy::{PolicyProvider, StaticPolicy};
use crate::serial::SerialGenerator;
use crate::store::{CounterUpdate, TokenStore};
use crate::token::{Token, TokenTypeRegistry};

// ============================================================================
// 结果与选项
// ============================================================================

/// 认证结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// 认证成功
    Success { serial: String },
    /// 认证失败
    Failure,
    /// 已触发 challenge，等待应答
    ChallengePending {
        transaction_id: String,
        serial: String,
    },
    /// 同一凭据匹配了多个有效 token
    AmbiguousMatch { serials: Vec<String> },
    /// 多个 token 同时请求 challenge
    MultipleChallenges { serials: Vec<String> },
}

impl AuthResult {
    /// 是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success { .. })
    }
}

/// 带审计信息的认证结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReport {
    /// 认证结果
    pub result: AuthResult,
    /// 选出的审计记录
    pub audit: Option<AuditSummary>,
    /// 说明
    pub message: String,
}

impl AuthReport {
    fn new(result: AuthResult, audit: Option<AuditSummary>, message: impl Into<String>) -> Self {
        Self {
            result,
            audit,
            message: message.into(),
        }
    }
}

/// 单次认证的选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOptions {
    /// 只考虑属于该 realm 的 token，同时用于策略查询
    pub realm: Option<String>,
    /// 只考虑这些类型
    pub enabled_types: Option<Vec<String>>,
    /// 当前时间，默认为调用时的时间
    pub now: Option<DateTime<Utc>>,
    /// 截止时间
    pub deadline: Option<DateTime<Utc>>,
    /// 应答的 challenge 事务 ID
    pub transaction_id: Option<String>,
}

impl AuthOptions {
    /// 创建默认选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// 设置启用的类型
    pub fn with_enabled_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// 设置当前时间
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// 设置截止时间
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 应答 challenge
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

// ============================================================================
// AuthenticationService
// ============================================================================

/// 认证服务
pub struct AuthenticationService {
    store: Arc<dyn TokenStore>,
    registry: Arc<TokenTypeRegistry>,
    policy: Arc<dyn PolicyProvider>,
    directory: Arc<dyn DirectoryAuthenticator>,
    audit: Arc<dyn AuditLogger>,
    lookup: TokenResolver,
    verifier: TokenVerifier,
    matcher: MultiTokenMatcher,
    resolver: OutcomeResolver,
    challenges: ChallengeRegistry,
    config: EngineConfig,
}

impl AuthenticationService {
    /// 创建认证服务
    ///
    /// 默认使用空的内存目录、全部默认值的静态策略，不记录审计事件。
    pub fn new(
        store: Arc<dyn TokenStore>,
        registry: Arc<TokenTypeRegistry>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let verifier = TokenVerifier::new(registry.clone());

        Ok(Self {
            lookup: TokenResolver::new(store.clone()),
            matcher: MultiTokenMatcher::new(verifier.clone()),
            verifier,
            resolver: OutcomeResolver::new(),
            challenges: ChallengeRegistry::new(config.challenge_validity()),
            policy: Arc::new(StaticPolicy::default()),
            directory: Arc::new(InMemoryDirectory::new()),
            audit: Arc::new(NoOpAuditLogger),
            store,
            registry,
            config,
        })
    }

    /// 设置策略提供者
    pub fn with_policy(mut self, policy: Arc<dyn PolicyProvider>) -> Self {
        self.policy = policy;
        self
    }

    /// 设置用户目录
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryAuthenticator>) -> Self {
        self.directory = directory;
        self
    }

    /// 设置审计日志记录器
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// 配置
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 未完成的 challenge
    pub fn challenges(&self) -> &ChallengeRegistry {
        &self.challenges
    }

    /// 共享同一存储与类型注册表的序列号生成器
    pub fn serial_generator(&self) -> SerialGenerator {
        SerialGenerator::new(
            self.store.clone(),
            self.registry.clone(),
            self.config.clone(),
        )
    }

    fn auto_assigner(&self) -> AutoAssigner {
        AutoAssigner::new(
            self.store.clone(),
            self.registry.clone(),
            self.directory.clone(),
            self.policy.clone(),
        )
    }

    fn log(&self, user: Option<&UserRef>, event: SecurityEvent) {
        let event = match user {
            Some(user) => event.with_user_id(user.user_id.clone()),
            None => event,
        };
        self.audit.log(event);
    }

    /// 认证
    pub fn authenticate(
        &self,
        user: Option<&UserRef>,
        serial: Option<&str>,
        credential: &str,
        options: &AuthOptions,
    ) -> Result<AuthResult> {
        self.authenticate_detailed(user, serial, credential, options)
            .map(|report| report.result)
    }

    /// 认证，同时返回选出的审计记录
    pub fn authenticate_detailed(
        &self,
        user: Option<&UserRef>,
        serial: Option<&str>,
        credential: &str,
        options: &AuthOptions,
    ) -> Result<AuthReport> {
        if credential.is_empty() {
            self.log(user, SecurityEvent::token_auth_failed("credential is missing"));
            return Err(AuthError::MissingCredential.into());
        }

        let now = options.now.unwrap_or_else(Utc::now);
        let policy_realm = options
            .realm
            .as_deref()
            .or(user.map(|u| u.realm.as_str()))
            .unwrap_or_default();

        let mut ctx = VerifyContext::new(now)
            .with_prepend_pin(self.config.prepend_pin)
            .with_pin_policy(self.policy.pin_policy(policy_realm))
            .with_directory(self.directory.as_ref())
            .with_fail_counter_clear_timeout(self.config.fail_counter_clear_timeout());
        ctx.realm = options.realm.as_deref();
        ctx.enabled_types = options.enabled_types.as_deref();
        ctx.deadline = options.deadline;

        let candidates = self.lookup.candidates(user, serial)?;

        if let Some(transaction_id) = options.transaction_id.as_deref() {
            return self.answer_challenge(transaction_id, &candidates, credential, user, &ctx);
        }

        if candidates.is_empty() {
            if let (Some(user), None) = (user, serial)
                && let Some(token) = self
                    .auto_assigner()
                    .try_auto_assign(credential, user, policy_realm, &ctx)?
            {
                self.log(
                    Some(user),
                    SecurityEvent::token_auto_assigned(
                        user.user_id.clone(),
                        token.serial.clone(),
                        token.token_type.clone(),
                    ),
                );
                return Ok(AuthReport::new(
                    AuthResult::Success {
                        serial: token.serial,
                    },
                    None,
                    "token auto-assigned",
                ));
            }

            self.log(user, SecurityEvent::token_auth_failed("no token found"));
            return Err(AuthError::NoTokenFound.into());
        }

        let matched = self.matcher.match_tokens(&candidates, credential, &ctx)?;
        let summary = select_audit_entry(&matched.audit_entries);

        match matched.challenge.as_slice() {
            [] => {}
            [serial] => {
                let challenge = self.challenges.create(serial, now)?;
                info!(serial = %serial, "challenge triggered");
                self.log(
                    user,
                    SecurityEvent::challenge_triggered(
                        serial.clone(),
                        token_type_of(&candidates, serial),
                        challenge.transaction_id.clone(),
                    ),
                );
                return Ok(AuthReport::new(
                    AuthResult::ChallengePending {
                        transaction_id: challenge.transaction_id,
                        serial: serial.clone(),
                    },
                    summary,
                    "challenge triggered",
                ));
            }
            many => {
                warn!(serials = ?many, "more than one token requested a challenge");
                self.log(user, SecurityEvent::multiple_challenges(many));
                return Ok(AuthReport::new(
                    AuthResult::MultipleChallenges {
                        serials: many.to_vec(),
                    },
                    summary,
                    "more than one token requested a challenge",
                ));
            }
        }

        let resolution = match self.resolver.resolve(&matched) {
            Ok(resolution) => resolution,
            Err(Error::Auth(AuthError::AmbiguousMatch { serials })) => {
                // OTP 值已被使用，即使无法判定归属也要消费
                self.store.apply(&matched.otp_updates, now)?;
                warn!(serials = ?serials, "credential matched more than one token");
                self.log(user, SecurityEvent::ambiguous_match(&serials));
                return Ok(AuthReport::new(
                    AuthResult::AmbiguousMatch { serials },
                    summary,
                    "credential matched more than one token",
                ));
            }
            Err(e) => return Err(e),
        };

        let mut updates = matched.otp_updates.clone();
        updates.extend(resolution.updates);
        self.store.apply(&updates, now)?;

        match resolution.verdict {
            Verdict::Success(serial) => {
                self.challenges.remove_for_serial(&serial)?;
                info!(serial = %serial, "token authenticated");
                self.log(
                    user,
                    SecurityEvent::token_auth_success(
                        serial.clone(),
                        token_type_of(&candidates, &serial),
                    ),
                );
                Ok(AuthReport::new(
                    AuthResult::Success { serial },
                    summary,
                    "matching 1 tokens",
                ))
            }
            Verdict::Failure => {
                let message = summary
                    .as_ref()
                    .map(|s| s.detail.clone())
                    .unwrap_or_else(|| "no token matched".to_string());
                info!(considered = matched.considered(), reason = %message, "authentication failed");

                let mut event = SecurityEvent::token_auth_failed(message.clone());
                if let Some(summary) = &summary {
                    event = event.with_token(summary.serial.clone(), summary.token_type.clone());
                }
                self.log(user, event);
                Ok(AuthReport::new(AuthResult::Failure, summary, message))
            }
        }
    }

    /// 应答已触发的 challenge，凭据只包含 OTP
    fn answer_challenge(
        &self,
        transaction_id: &str,
        candidates: &[Token],
        otp: &str,
        user: Option<&UserRef>,
        ctx: &VerifyContext<'_>,
    ) -> Result<AuthReport> {
        let token = self
            .challenges
            .get(transaction_id)?
            .filter(|c| !c.is_expired(ctx.now))
            .and_then(|c| candidates.iter().find(|t| t.serial == c.serial));

        let Some(token) = token else {
            let message = "challenge not found or expired";
            info!(transaction_id = %transaction_id, "{}", message);
            self.log(user, SecurityEvent::token_auth_failed(message));
            return Ok(AuthReport::new(AuthResult::Failure, None, message));
        };

        let outcome = self.verifier.verify_response(token, otp, ctx)?;
        let mut detail = outcome.to_string();
        let mut updates = Vec::new();
        let mut success = false;

        match outcome {
            VerificationOutcome::Valid { matched_counter } => {
                updates.push(CounterUpdate::ConsumeOtp {
                    serial: token.serial.clone(),
                    counter: matched_counter,
                });
                match matcher::check_live(token, ctx.now, ctx.fail_counter_clear_timeout) {
                    Ok(transient) => {
                        updates.push(CounterUpdate::RecordSuccess {
                            serial: token.serial.clone(),
                            clear_fail_counter: transient,
                        });
                        success = true;
                    }
                    Err(reason) => detail = format!("{}, {}", detail, reason),
                }
            }
            _ => updates.push(CounterUpdate::RecordFailure {
                serial: token.serial.clone(),
                count_auth: true,
            }),
        }

        self.store.apply(&updates, ctx.now)?;

        let summary = select_audit_entry(&[AuditEntry {
            serial: token.serial.clone(),
            token_type: token.token_type.clone(),
            weight: outcome.weight(),
            detail: detail.clone(),
        }]);

        if success {
            self.challenges.remove(transaction_id)?;
            info!(serial = %token.serial, "challenge answered");
            self.log(
                user,
                SecurityEvent::token_auth_success(token.serial.clone(), token.token_type.clone())
                    .with_detail("transaction_id", transaction_id),
            );
            Ok(AuthReport::new(
                AuthResult::Success {
                    serial: token.serial.clone(),
                },
                summary,
                "challenge answered",
            ))
        } else {
            self.log(
                user,
                SecurityEvent::token_auth_failed(detail.clone())
                    .with_token(token.serial.clone(), token.token_type.clone())
                    .with_detail("transaction_id", transaction_id),
            );
            Ok(AuthReport::new(AuthResult::Failure, summary, detail))
        }
    }
}

fn token_type_of(tokens: &[Token], serial: &str) -> String {
    tokens
        .iter()
        .find(|t| t.serial == serial)
        .map(|t| t.token_type.clone())
        .unwrap_or_default()
}
