//! 单 token 验证
//!
//! [`TokenVerifier::verify`] 把一个凭据相对一个 token 分类为
//! [`VerificationOutcome`] 中的一种。验证是只读的，不修改 token。

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

use crate::directory::DirectoryAuthenticator;
use crate::error::{AuthError, Error, Result};
use crate::policy::PinPolicy;
use crate::token::{Token, TokenBehavior, TokenTypeRegistry};

/// 单个 token 的验证结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// 凭据只包含 PIN，token 请求 challenge
    ChallengeRequested,
    /// 目录密码错误（`PinPolicy::UserStore`）
    WrongUserPassword,
    /// PIN 错误
    WrongPin,
    /// PIN 正确，OTP 错误
    WrongOtp,
    /// PIN 与 OTP 都正确
    Valid {
        /// 匹配到的 OTP 计数器
        matched_counter: u64,
    },
}

impl VerificationOutcome {
    /// 审计权重，权重越高越能说明用户的意图
    pub fn weight(&self) -> u32 {
        match self {
            VerificationOutcome::WrongUserPassword => 10,
            VerificationOutcome::WrongPin => 15,
            VerificationOutcome::ChallengeRequested => 20,
            VerificationOutcome::WrongOtp => 25,
            VerificationOutcome::Valid { .. } => 30,
        }
    }

    /// 是否有效
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid { .. })
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::ChallengeRequested => write!(f, "challenge requested"),
            VerificationOutcome::WrongUserPassword => write!(f, "wrong user password"),
            VerificationOutcome::WrongPin => write!(f, "wrong pin"),
            VerificationOutcome::WrongOtp => write!(f, "wrong otp value"),
            VerificationOutcome::Valid { .. } => write!(f, "matching otp value"),
        }
    }
}

/// 一次认证的上下文
///
/// 在一次认证期间不变。
#[derive(Clone, Copy)]
pub struct VerifyContext<'a> {
    /// 当前时间
    pub now: DateTime<Utc>,
    /// PIN 在 OTP 之前
    pub prepend_pin: bool,
    /// PIN 校验方式
    pub pin_policy: PinPolicy,
    /// 用户目录（`PinPolicy::UserStore` 使用）
    pub directory: Option<&'a dyn DirectoryAuthenticator>,
    /// 只考虑属于该 realm 的 token
    pub realm: Option<&'a str>,
    /// 只考虑这些类型，`None` 表示所有已注册类型
    pub enabled_types: Option<&'a [String]>,
    /// 截止时间
    pub deadline: Option<DateTime<Utc>>,
    /// 失败计数清除超时
    pub fail_counter_clear_timeout: Option<Duration>,
}

impl fmt::Debug for VerifyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyContext")
            .field("now", &self.now)
            .field("prepend_pin", &self.prepend_pin)
            .field("pin_policy", &self.pin_policy)
            .field("has_directory", &self.directory.is_some())
            .field("realm", &self.realm)
            .field("enabled_types", &self.enabled_types)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<'a> VerifyContext<'a> {
    /// 使用默认设置创建上下文
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            prepend_pin: true,
            pin_policy: PinPolicy::Token,
            directory: None,
            realm: None,
            enabled_types: None,
            deadline: None,
            fail_counter_clear_timeout: None,
        }
    }

    /// 设置 PIN 位置
    pub fn with_prepend_pin(mut self, prepend_pin: bool) -> Self {
        self.prepend_pin = prepend_pin;
        self
    }

    /// 设置 PIN 校验方式
    pub fn with_pin_policy(mut self, pin_policy: PinPolicy) -> Self {
        self.pin_policy = pin_policy;
        self
    }

    /// 设置用户目录
    pub fn with_directory(mut self, directory: &'a dyn DirectoryAuthenticator) -> Self {
        self.directory = Some(directory);
        self
    }

    /// 设置 realm 过滤
    pub fn with_realm(mut self, realm: &'a str) -> Self {
        self.realm = Some(realm);
        self
    }

    /// 设置启用的类型
    pub fn with_enabled_types(mut self, types: &'a [String]) -> Self {
        self.enabled_types = Some(types);
        self
    }

    /// 设置截止时间
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 设置失败计数清除超时
    pub fn with_fail_counter_clear_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fail_counter_clear_timeout = timeout;
        self
    }
}

/// 单 token 验证器
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    registry: Arc<TokenTypeRegistry>,
}

impl TokenVerifier {
    /// 创建验证器
    pub fn new(registry: Arc<TokenTypeRegistry>) -> Self {
        Self { registry }
    }

    /// 类型注册表
    pub fn registry(&self) -> &TokenTypeRegistry {
        &self.registry
    }

    pub(crate) fn behavior(&self, token: &Token) -> Result<Arc<dyn TokenBehavior>> {
        self.registry
            .get(&token.token_type)
            .ok_or_else(|| Error::Auth(AuthError::UnknownTokenType(token.token_type.clone())))
    }

    /// 分类凭据
    ///
    /// 未启用的 token 同样会被验证，是否采用结果由调用方决定。
    pub fn verify(
        &self,
        token: &Token,
        credential: &str,
        ctx: &VerifyContext<'_>,
    ) -> Result<VerificationOutcome> {
        let behavior = self.behavior(token)?;

        // 整个凭据就是 PIN 时可能是 challenge 请求
        if behavior.capabilities().challenge
            && ctx.pin_policy != PinPolicy::None
            && behavior.is_challenge_request(token, true)
            && self.pin_matches(token, credential, ctx)?
        {
            return Ok(VerificationOutcome::ChallengeRequested);
        }

        let (pin, otp) = match ctx.pin_policy {
            PinPolicy::None => (String::new(), credential.to_string()),
            _ => behavior.split(token, credential, ctx.prepend_pin),
        };

        if !self.pin_matches(token, &pin, ctx)? {
            return Ok(match ctx.pin_policy {
                PinPolicy::UserStore => VerificationOutcome::WrongUserPassword,
                _ => VerificationOutcome::WrongPin,
            });
        }

        Ok(match behavior.check_otp(token, &otp, ctx.now)? {
            Some(matched_counter) => VerificationOutcome::Valid { matched_counter },
            None => VerificationOutcome::WrongOtp,
        })
    }

    /// 只检查 OTP（应答已触发的 challenge 时使用）
    pub fn verify_response(
        &self,
        token: &Token,
        otp: &str,
        ctx: &VerifyContext<'_>,
    ) -> Result<VerificationOutcome> {
        let behavior = self.behavior(token)?;
        Ok(match behavior.check_otp(token, otp, ctx.now)? {
            Some(matched_counter) => VerificationOutcome::Valid { matched_counter },
            None => VerificationOutcome::WrongOtp,
        })
    }

    fn pin_matches(&self, token: &Token, pin: &str, ctx: &VerifyContext<'_>) -> Result<bool> {
        match ctx.pin_policy {
            PinPolicy::Token => Ok(token.check_pin(pin)),
            PinPolicy::UserStore => match (&token.owner, ctx.directory) {
                (Some(owner), Some(directory)) => {
                    directory.check_password(&owner.user_id, &owner.resolver, pin)
                }
                _ => Ok(false),
            },
            PinPolicy::None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::password::PasswordHasher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录查询次数的目录
    #[derive(Default)]
    struct CountingDirectory {
        calls: AtomicUsize,
    }

    impl DirectoryAuthenticator for CountingDirectory {
        fn check_password(&self, _user_id: &str, _resolver: &str, password: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(password == "pw")
        }
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Arc::new(TokenTypeRegistry::with_defaults()))
    }

    fn hotp(serial: &str) -> Token {
        Token::new(serial, "hotp")
            .with_otp_key(b"12345678901234567890")
            .with_pin("1234")
            .unwrap()
    }

    #[test]
    fn test_classification() {
        let verifier = verifier();
        let token = hotp("T001");
        let ctx = VerifyContext::new(Utc::now());

        assert_eq!(
            verifier.verify(&token, "1234755224", &ctx).unwrap(),
            VerificationOutcome::Valid { matched_counter: 0 }
        );
        assert_eq!(
            verifier.verify(&token, "1234000000", &ctx).unwrap(),
            VerificationOutcome::WrongOtp
        );
        assert_eq!(
            verifier.verify(&token, "9999755224", &ctx).unwrap(),
            VerificationOutcome::WrongPin
        );
    }

    #[test]
    fn test_append_pin() {
        let verifier = verifier();
        let token = hotp("T001");
        let ctx = VerifyContext::new(Utc::now()).with_prepend_pin(false);

        assert!(verifier.verify(&token, "7552241234", &ctx).unwrap().is_valid());
    }

    #[test]
    fn test_verify_is_pure() {
        let verifier = verifier();
        let token = hotp("T001");
        let ctx = VerifyContext::new(Utc::now());

        let first = verifier.verify(&token, "1234287082", &ctx).unwrap();
        let second = verifier.verify(&token, "1234287082", &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(token.otp_counter, 0);
    }

    #[test]
    fn test_challenge_request() {
        let verifier = verifier();
        let token = Token::new("PIEM0001", "email")
            .with_otp_key(b"12345678901234567890")
            .with_pin("1234")
            .unwrap();
        let ctx = VerifyContext::new(Utc::now());

        assert_eq!(
            verifier.verify(&token, "1234", &ctx).unwrap(),
            VerificationOutcome::ChallengeRequested
        );
        // 不支持 challenge 的 HOTP token 只会得到 PIN 错误
        assert_eq!(
            verifier.verify(&hotp("T001"), "1234", &ctx).unwrap(),
            VerificationOutcome::WrongPin
        );
    }

    #[test]
    fn test_pin_policy_none() {
        let verifier = verifier();
        let token = hotp("T001");
        let ctx = VerifyContext::new(Utc::now()).with_pin_policy(PinPolicy::None);

        assert!(verifier.verify(&token, "755224", &ctx).unwrap().is_valid());
        assert_eq!(
            verifier.verify(&token, "000000", &ctx).unwrap(),
            VerificationOutcome::WrongOtp
        );
    }

    #[test]
    fn test_pin_policy_user_store() {
        let verifier = verifier();
        let directory =
            InMemoryDirectory::with_hasher(PasswordHasher::with_params(1024, 1, 1).unwrap());
        directory.add_user("alice", "corp", "pw").unwrap();

        let owned = hotp("T001").with_owner("alice", "corp");
        let unowned = hotp("T002");
        let ctx = VerifyContext::new(Utc::now())
            .with_pin_policy(PinPolicy::UserStore)
            .with_directory(&directory);

        assert!(verifier.verify(&owned, "pw755224", &ctx).unwrap().is_valid());
        assert_eq!(
            verifier.verify(&owned, "1234755224", &ctx).unwrap(),
            VerificationOutcome::WrongUserPassword
        );
        assert_eq!(
            verifier.verify(&unowned, "pw755224", &ctx).unwrap(),
            VerificationOutcome::WrongUserPassword
        );
    }

    #[test]
    fn test_user_store_single_lookup_without_challenge_flag() {
        let verifier = verifier();
        let directory = CountingDirectory::default();
        let token = hotp("T001").with_owner("alice", "corp");
        let ctx = VerifyContext::new(Utc::now())
            .with_pin_policy(PinPolicy::UserStore)
            .with_directory(&directory);

        assert!(verifier.verify(&token, "pw755224", &ctx).unwrap().is_valid());
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        // 启用 challenge 后，整个凭据先按 PIN 检查一次
        let token = token.with_info("challenge_response", "true");
        assert_eq!(
            verifier.verify(&token, "pw", &ctx).unwrap(),
            VerificationOutcome::ChallengeRequested
        );
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_type() {
        let verifier = verifier();
        let token = Token::new("X001", "ocra");
        let result = verifier.verify(&token, "1234", &VerifyContext::new(Utc::now()));
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::UnknownTokenType(_)))
        ));
    }

    #[test]
    fn test_weights_order() {
        assert!(
            VerificationOutcome::Valid { matched_counter: 0 }.weight()
                > VerificationOutcome::WrongOtp.weight()
        );
        assert!(VerificationOutcome::WrongOtp.weight() > VerificationOutcome::ChallengeRequested.weight());
        assert!(VerificationOutcome::WrongPin.weight() > VerificationOutcome::WrongUserPassword.weight());
    }
}
