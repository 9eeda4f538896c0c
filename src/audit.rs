//! 审计日志模块
//!
//! 记录 token 认证过程中的安全事件，包括：
//!
//! - **安全事件**: 认证成功、失败、challenge 触发、歧义匹配、自动分配
//! - **审计日志 Trait**: 定义日志记录接口
//! - **内存实现**: 用于测试和开发的简单实现
//!
//! 每次 `authenticate` 调用恰好记录一条事件，事件携带审计选择得到的
//! token 序列号、类型和详情。
//!
//! ## 使用示例
//!
//! ```rust
//! use tokenrs::audit::{AuditLogger, EventSeverity, EventType, InMemoryAuditLogger, SecurityEvent};
//!
//! let logger = InMemoryAuditLogger::new();
//!
//! logger.log(SecurityEvent::token_auth_success("OATH0001", "hotp").with_user_id("alice"));
//! logger.log(SecurityEvent::token_auth_failed("wrong otp value").with_user_id("bob"));
//!
//! assert_eq!(logger.event_count(), 2);
//! assert_eq!(logger.get_events_by_user("alice").len(), 1);
//! assert_eq!(
//!     logger.get_events_by_type(&EventType::TokenAuthFailed)[0].severity,
//!     EventSeverity::Warning
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 事件严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventSeverity {
    /// 一般信息
    #[default]
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSeverity::Info => write!(f, "INFO"),
            EventSeverity::Warning => write!(f, "WARNING"),
            EventSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// 安全事件类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// token 认证成功
    TokenAuthSuccess,
    /// token 认证失败
    TokenAuthFailed,
    /// 触发 challenge
    ChallengeTriggered,
    /// 同一凭据匹配多个 token
    AmbiguousMatch,
    /// 多个 token 同时请求 challenge
    MultipleChallenges,
    /// token 自动分配给用户
    TokenAutoAssigned,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::TokenAuthSuccess => write!(f, "token_auth_success"),
            EventType::TokenAuthFailed => write!(f, "token_auth_failed"),
            EventType::ChallengeTriggered => write!(f, "challenge_triggered"),
            EventType::AmbiguousMatch => write!(f, "ambiguous_match"),
            EventType::MultipleChallenges => write!(f, "multiple_challenges"),
            EventType::TokenAutoAssigned => write!(f, "token_auto_assigned"),
        }
    }
}

/// 安全事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 事件 ID
    pub id: String,
    /// 事件类型
    pub event_type: EventType,
    /// 严重程度
    pub severity: EventSeverity,
    /// 用户 ID（如果适用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// token 序列号（审计选择有歧义时为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// token 类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// 事件消息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 额外详情
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    /// 事件时间
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// 创建新的安全事件
    pub fn new(event_type: EventType, severity: EventSeverity) -> Self {
        Self {
            id: generate_event_id(),
            event_type,
            severity,
            user_id: None,
            serial: None,
            token_type: None,
            message: None,
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    // ========================================================================
    // 便捷构造方法
    // ========================================================================

    /// 创建认证成功事件
    pub fn token_auth_success(serial: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self::new(EventType::TokenAuthSuccess, EventSeverity::Info)
            .with_token(serial, token_type)
            .with_message("token authenticated successfully")
    }

    /// 创建认证失败事件
    pub fn token_auth_failed(reason: impl Into<String>) -> Self {
        Self::new(EventType::TokenAuthFailed, EventSeverity::Warning).with_message(reason)
    }

    /// 创建 challenge 触发事件
    pub fn challenge_triggered(
        serial: impl Into<String>,
        token_type: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self::new(EventType::ChallengeTriggered, EventSeverity::Info)
            .with_token(serial, token_type)
            .with_detail("transaction_id", transaction_id)
            .with_message("challenge triggered")
    }

    /// 创建歧义匹配事件
    pub fn ambiguous_match(serials: &[String]) -> Self {
        Self::new(EventType::AmbiguousMatch, EventSeverity::Error)
            .with_detail("serials", serials.join(","))
            .with_message("credential matched more than one token")
    }

    /// 创建多 challenge 事件
    pub fn multiple_challenges(serials: &[String]) -> Self {
        Self::new(EventType::MultipleChallenges, EventSeverity::Error)
            .with_detail("serials", serials.join(","))
            .with_message("more than one token requested a challenge")
    }

    /// 创建自动分配事件
    pub fn token_auto_assigned(
        user_id: impl Into<String>,
        serial: impl Into<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self::new(EventType::TokenAutoAssigned, EventSeverity::Info)
            .with_user_id(user_id)
            .with_token(serial, token_type)
            .with_message("token assigned to user on first use")
    }

    // ========================================================================
    // Builder 方法
    // ========================================================================

    /// 设置用户 ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 设置 token 序列号和类型，空字符串视为未知
    pub fn with_token(mut self, serial: impl Into<String>, token_type: impl Into<String>) -> Self {
        let serial = serial.into();
        let token_type = token_type.into();
        self.serial = (!serial.is_empty()).then_some(serial);
        self.token_type = (!token_type.is_empty()).then_some(token_type);
        self
    }

    /// 设置消息
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 添加详情
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    // ========================================================================
    // 查询方法
    // ========================================================================

    /// 获取事件类型名称
    pub fn event_name(&self) -> String {
        self.event_type.to_string()
    }

    /// 检查是否是高严重程度事件
    pub fn is_high_severity(&self) -> bool {
        self.severity == EventSeverity::Error
    }
}

/// 生成事件 ID
fn generate_event_id() -> String {
    use crate::random::generate_random_hex;
    format!(
        "evt_{}",
        generate_random_hex(16).unwrap_or_else(|_| "unknown".to_string())
    )
}

// ============================================================================
// AuditLogger Trait
// ============================================================================

/// 审计日志记录器 trait
pub trait AuditLogger: Send + Sync {
    /// 记录安全事件
    fn log(&self, event: SecurityEvent);
}

// ============================================================================
// InMemoryAuditLogger
// ============================================================================

/// 内存审计日志记录器
///
/// 用于测试和开发环境，将事件存储在内存中。克隆后共享同一份事件列表。
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogger {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
    max_events: Option<usize>,
}

impl InMemoryAuditLogger {
    /// 创建新的内存日志记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带有最大事件数限制的日志记录器
    pub fn with_max_events(max: usize) -> Self {
        Self {
            events: Arc::default(),
            max_events: Some(max),
        }
    }

    // 审计不应因为某个写入方 panic 而中断
    fn read(&self) -> RwLockReadGuard<'_, Vec<SecurityEvent>> {
        self.events.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<SecurityEvent>> {
        self.events.write().unwrap_or_else(|e| e.into_inner())
    }

    fn filtered(&self, predicate: impl Fn(&SecurityEvent) -> bool) -> Vec<SecurityEvent> {
        self.read()
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// 获取所有事件
    pub fn get_events(&self) -> Vec<SecurityEvent> {
        self.read().clone()
    }

    /// 获取事件数量
    pub fn event_count(&self) -> usize {
        self.read().len()
    }

    /// 按用户 ID 获取事件
    pub fn get_events_by_user(&self, user_id: &str) -> Vec<SecurityEvent> {
        self.filtered(|e| e.user_id.as_deref() == Some(user_id))
    }

    /// 按 token 序列号获取事件
    pub fn get_events_by_serial(&self, serial: &str) -> Vec<SecurityEvent> {
        self.filtered(|e| e.serial.as_deref() == Some(serial))
    }

    /// 按事件类型获取事件
    pub fn get_events_by_type(&self, event_type: &EventType) -> Vec<SecurityEvent> {
        self.filtered(|e| &e.event_type == event_type)
    }

    /// 按严重程度获取事件
    pub fn get_events_by_severity(&self, severity: EventSeverity) -> Vec<SecurityEvent> {
        self.filtered(|e| e.severity == severity)
    }

    /// 获取最近一个事件
    pub fn last_event(&self) -> Option<SecurityEvent> {
        self.read().last().cloned()
    }

    /// 清空所有事件
    pub fn clear(&self) {
        self.write().clear();
    }
}

impl AuditLogger for InMemoryAuditLogger {
    fn log(&self, event: SecurityEvent) {
        let mut events = self.write();

        // 超过上限时丢弃最旧的事件
        if let Some(max) = self.max_events {
            while !events.is_empty() && events.len() >= max {
                events.remove(0);
            }
        }

        events.push(event);
    }
}

// ============================================================================
// NoOpAuditLogger
// ============================================================================

/// 空操作日志记录器
///
/// 不执行任何操作，用于禁用审计日志
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAuditLogger;

impl AuditLogger for NoOpAuditLogger {
    fn log(&self, _event: SecurityEvent) {}
}

// ============================================================================
// 测试
// ============================================================================
