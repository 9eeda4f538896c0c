//! 候选 token 查找

use std::sync::Arc;

use crate::directory::UserRef;
use crate::error::{Error, Result, ValidationError};
use crate::store::TokenStore;
use crate::token::Token;

/// 候选 token 查找器
pub struct TokenResolver {
    store: Arc<dyn TokenStore>,
}

impl TokenResolver {
    /// 创建查找器
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// 查找候选 token
    ///
    /// - 只有序列号：该序列号的 token
    /// - 只有用户：用户拥有的全部 token
    /// - 两者都有：该序列号且属于该用户的 token
    pub fn candidates(&self, user: Option<&UserRef>, serial: Option<&str>) -> Result<Vec<Token>> {
        match (user, serial) {
            (None, Some(serial)) => Ok(self.store.find_by_serial(serial)?.into_iter().collect()),
            (Some(user), None) => self.store.find_by_user(&user.user_id, &user.resolver),
            (Some(user), Some(serial)) => Ok(self
                .store
                .find_by_serial(serial)?
                .filter(|t| t.is_owned_by(&user.user_id, &user.resolver))
                .into_iter()
                .collect()),
            (None, None) => Err(Error::Validation(ValidationError::EmptyField(
                "user or serial".to_string(),
            ))),
        }
    }
}
