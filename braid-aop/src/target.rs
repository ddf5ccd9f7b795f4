//! 目标源
//!
//! 代理在每次调用时从目标源获取目标对象，调用结束后归还。

use crate::error::InvocationError;
use crate::operation::Value;

/// 目标源
pub trait TargetSource: Send + Sync {
    /// 目标类型名称，未知时为空
    fn target_type(&self) -> Option<&'static str>;

    /// 每次调用是否都返回同一个目标
    fn is_static(&self) -> bool;

    fn get_target(&self) -> Result<Option<Value>, InvocationError>;

    fn release_target(&self, target: Option<Value>) {
        let _ = target;
    }
}

/// 始终返回同一个目标
#[derive(Clone)]
pub struct SingletonTargetSource {
    target: Value,
    target_type: &'static str,
}

impl SingletonTargetSource {
    pub fn new(target: Value, target_type: &'static str) -> Self {
        Self {
            target,
            target_type,
        }
    }

    pub fn target(&self) -> &Value {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_type(&self) -> Option<&'static str> {
        Some(self.target_type)
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> Result<Option<Value>, InvocationError> {
        Ok(Some(self.target.clone()))
    }
}

/// 没有目标：所有行为都由拦截器（例如引入）提供
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTargetSource {
    target_type: Option<&'static str>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(target_type: &'static str) -> Self {
        Self {
            target_type: Some(target_type),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_type(&self) -> Option<&'static str> {
        self.target_type
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> Result<Option<Value>, InvocationError> {
        Ok(None)
    }
}
