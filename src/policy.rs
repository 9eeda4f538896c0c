//! 策略查询
//!
//! 引擎在一次认证期间只读取策略值，不修改它们。
//!
//! ## 示例
//!
//! ```rust
//! use tokenrs::policy::{PinPolicy, PolicyProvider, RealmPolicy, StaticPolicy};
//!
//! let policy = StaticPolicy::new()
//!     .with_realm("sales", RealmPolicy::default().with_autoassignment(true))
//!     .with_realm("ops", RealmPolicy::default().with_pin_policy(PinPolicy::UserStore));
//!
//! assert!(policy.is_autoassignment_enabled("sales"));
//! assert!(!policy.is_autoassignment_enabled("default"));
//! assert_eq!(policy.pin_policy("ops"), PinPolicy::UserStore);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// PIN 校验方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinPolicy {
    /// 与 token 自身的 PIN 比较
    #[default]
    Token,
    /// 凭据的 PIN 部分是用户的目录密码
    UserStore,
    /// 不检查 PIN，整个凭据都是 OTP
    None,
}

/// 策略提供者 trait
pub trait PolicyProvider: Send + Sync {
    /// realm 是否启用自动分配
    fn is_autoassignment_enabled(&self, realm: &str) -> bool;

    /// 自动分配时是否把凭据的 PIN 部分设为 token PIN
    fn autoassign_sets_pin(&self, realm: &str) -> bool;

    /// realm 的 PIN 校验方式
    fn pin_policy(&self, realm: &str) -> PinPolicy;
}

/// 单个 realm 的策略
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmPolicy {
    /// 是否启用自动分配
    pub autoassignment: bool,
    /// 自动分配时是否设置 PIN
    pub autoassign_sets_pin: bool,
    /// PIN 校验方式
    pub pin_policy: PinPolicy,
}

impl RealmPolicy {
    /// 设置自动分配
    pub fn with_autoassignment(mut self, enabled: bool) -> Self {
        self.autoassignment = enabled;
        self
    }

    /// 设置自动分配时是否设置 PIN
    pub fn with_autoassign_sets_pin(mut self, enabled: bool) -> Self {
        self.autoassign_sets_pin = enabled;
        self
    }

    /// 设置 PIN 校验方式
    pub fn with_pin_policy(mut self, pin_policy: PinPolicy) -> Self {
        self.pin_policy = pin_policy;
        self
    }
}

/// 静态策略
///
/// 未单独配置的 realm 使用默认策略。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticPolicy {
    /// 默认策略
    #[serde(default)]
    pub default: RealmPolicy,
    /// 按 realm 覆盖
    #[serde(default)]
    pub realms: HashMap<String, RealmPolicy>,
}

impl StaticPolicy {
    /// 创建使用默认值的策略
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置默认策略
    pub fn with_default(mut self, policy: RealmPolicy) -> Self {
        self.default = policy;
        self
    }

    /// 为 realm 设置策略
    pub fn with_realm(mut self, realm: impl Into<String>, policy: RealmPolicy) -> Self {
        self.realms.insert(realm.into(), policy);
        self
    }

    fn for_realm(&self, realm: &str) -> &RealmPolicy {
        self.realms.get(realm).unwrap_or(&self.default)
    }
}

impl PolicyProvider for StaticPolicy {
    fn is_autoassignment_enabled(&self, realm: &str) -> bool {
        self.for_realm(realm).autoassignment
    }

    fn autoassign_sets_pin(&self, realm: &str) -> bool {
        self.for_realm(realm).autoassign_sets_pin
    }

    fn pin_policy(&self, realm: &str) -> PinPolicy {
        self.for_realm(realm).pin_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = StaticPolicy::new();
        assert!(!policy.is_autoassignment_enabled("any"));
        assert!(!policy.autoassign_sets_pin("any"));
        assert_eq!(policy.pin_policy("any"), PinPolicy::Token);
    }

    #[test]
    fn test_realm_override() {
        let policy = StaticPolicy::new()
            .with_default(RealmPolicy::default().with_pin_policy(PinPolicy::None))
            .with_realm(
                "default",
                RealmPolicy::default()
                    .with_autoassignment(true)
                    .with_autoassign_sets_pin(true),
            );

        assert!(policy.autoassign_sets_pin("default"));
        assert_eq!(policy.pin_policy("default"), PinPolicy::Token);
        assert_eq!(policy.pin_policy("other"), PinPolicy::None);
    }

    #[test]
    fn test_policy_deserialization() {
        let json = r#"{"realms":{"ops":{"autoassignment":false,"autoassign_sets_pin":false,"pin_policy":"user_store"}}}"#;
        let policy: StaticPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.pin_policy("ops"), PinPolicy::UserStore);
    }
}
