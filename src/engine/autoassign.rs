//! 自动分配
//!
//! 用户还没有任何 token 时，可以用一个未分配 token 的 OTP 值加上自己的目录密码
//! 认证；OTP 唯一地指向一个 token 时，该 token 被分配给用户。
//! 匹配到零个或多个 token、或者目录密码错误时，不产生任何副作用。

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::verifier::VerifyContext;
use crate::directory::{DirectoryAuthenticator, UserRef};
use crate::error::Result;
use crate::policy::PolicyProvider;
use crate::store::TokenStore;
use crate::token::{Token, TokenTypeRegistry};

/// 自动分配器
pub struct AutoAssigner {
    store: Arc<dyn TokenStore>,
    registry: Arc<TokenTypeRegistry>,
    directory: Arc<dyn DirectoryAuthenticator>,
    policy: Arc<dyn PolicyProvider>,
}

impl AutoAssigner {
    /// 创建自动分配器
    pub fn new(
        store: Arc<dyn TokenStore>,
        registry: Arc<TokenTypeRegistry>,
        directory: Arc<dyn DirectoryAuthenticator>,
        policy: Arc<dyn PolicyProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            directory,
            policy,
        }
    }

    fn is_enabled_type(&self, token: &Token, ctx: &VerifyContext<'_>) -> bool {
        self.registry.contains(&token.token_type)
            && ctx.enabled_types.is_none_or(|types| {
                types
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&token.token_type))
            })
    }

    /// 尝试自动分配
    ///
    /// `policy_realm` 为查询策略使用的 realm。成功时返回已分配（并已消费本次 OTP）的 token。
    pub fn try_auto_assign(
        &self,
        credential: &str,
        user: &UserRef,
        policy_realm: &str,
        ctx: &VerifyContext<'_>,
    ) -> Result<Option<Token>> {
        if !self.policy.is_autoassignment_enabled(policy_realm) {
            return Ok(None);
        }
        if !self
            .store
            .find_by_user(&user.user_id, &user.resolver)?
            .is_empty()
        {
            return Ok(None);
        }

        let mut matches = Vec::new();
        for token in self.store.find_unassigned_in_realm(&user.realm)? {
            if !token.active
                || !self.is_enabled_type(&token, ctx)
                || !ctx.realm.is_none_or(|realm| token.in_realm(realm))
            {
                continue;
            }
            let Some(behavior) = self.registry.get(&token.token_type) else {
                continue;
            };
            let (pin, otp) = behavior.split(&token, credential, ctx.prepend_pin);
            match behavior.lookup_otp(&token, &otp, ctx.now) {
                Ok(Some(counter)) => {
                    debug!(serial = %token.serial, counter, "otp found in unassigned token");
                    matches.push((token, pin, counter));
                }
                Ok(None) => {}
                Err(e) if e.is_token_data() => {
                    warn!(serial = %token.serial, error = %e, "token record unusable, skipped");
                }
                Err(e) => return Err(e),
            }
        }

        let (token, pin, counter) = match matches.len() {
            0 => {
                debug!(user = %user.user_id, "no unassigned token matches");
                return Ok(None);
            }
            1 => matches.remove(0),
            n => {
                warn!(user = %user.user_id, matches = n, "otp matches several unassigned tokens");
                return Ok(None);
            }
        };

        if !self
            .directory
            .check_password(&user.user_id, &user.resolver, &pin)?
        {
            warn!(
                user = %user.user_id,
                serial = %token.serial,
                "auto-assignment refused, wrong user password"
            );
            return Ok(None);
        }

        let new_pin = self
            .policy
            .autoassign_sets_pin(policy_realm)
            .then_some(pin.as_str());
        let assigned = self
            .store
            .assign(&token.serial, user.as_owner(), new_pin, counter)?;

        info!(user = %user.user_id, serial = %assigned.serial, "token auto-assigned");
        Ok(Some(assigned))
    }
}
