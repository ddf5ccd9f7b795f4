//! 错误类型
//!
//! 分为两类：
//! - [`AopConfigError`]：配置期错误（通知类型未知、参数名非法、绑定失败等），一次性检测，永不重试
//! - [`InvocationError`]：调用期错误，包括目标方法/通知抛出的故障以及框架内部一致性故障

use std::error::Error;
use std::sync::Arc;

/// 目标方法或通知抛出的故障
///
/// 使用 `Arc` 保证故障在整条链上传播时保持同一身份
pub type Fault = Arc<dyn Error + Send + Sync>;

/// 配置错误
///
/// 在绑定或构建阶段检测，对配置层是致命的
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AopConfigError {
    #[error("Advice type '{0}' is not supported by any registered adapter")]
    UnknownAdviceType(String),

    #[error("'{name}' is not a valid parameter name in advice '{method}'")]
    IllegalParameterName { method: String, name: String },

    #[error("Advice '{method}' requires {unbound} argument(s) to be bound by name, but the argument names were not specified and could not be discovered")]
    UnresolvedParameterNames { method: String, unbound: usize },

    #[error("Advice '{method}' declares {expected} parameter(s) but {actual} argument name(s) were given")]
    ParameterNameCountMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Parameter name '{name}' is bound more than once in advice '{method}'")]
    DuplicateParameterName { method: String, name: String },

    #[error("{kind} argument name '{name}' was not bound in the arguments of advice '{method}'")]
    BindingNameNotFound {
        method: String,
        kind: &'static str,
        name: String,
    },

    #[error("Advice '{method}' expects parameter '{name}' to be bound by its pointcut, but the pointcut does not bind it")]
    PointcutCannotBind { method: String, name: String },

    #[error("Pointcut of advice '{method}' binds '{name}', which is not a parameter of the advice")]
    UnboundPointcutVariable { method: String, name: String },

    #[error("Join point parameter of advice '{method}' must be the first parameter, found at index {index}")]
    JoinPointNotFirst { method: String, index: usize },

    #[error("Invalid advice declaration '{method}': {reason}")]
    InvalidDeclaration { method: String, reason: String },

    #[error("Cannot modify advisors: proxy configuration is frozen")]
    Frozen,

    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),
}

/// 调用期错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    /// 目标方法或通知抛出的故障，原样传播
    #[error(transparent)]
    Thrown(Fault),

    /// 在调用期才暴露出来的配置错误（例如惰性参数绑定失败）
    #[error(transparent)]
    Configuration(#[from] AopConfigError),

    /// 绑定参数个数与声明不一致：绑定与匹配失去同步，属于框架缺陷
    #[error("Required to bind {required} arguments, but only bound {bound} (JoinPointMatch was{} bound in invocation)", negation(.join_point_match_bound))]
    BindingMismatch {
        required: usize,
        bound: usize,
        join_point_match_bound: bool,
    },

    /// 框架内部一致性错误
    #[error("Internal consistency fault: {0}")]
    Internal(String),

    /// 声明为非空基础类型的方法返回了空值
    #[error("Null return value from advice does not match primitive return type for: {0}")]
    NullReturn(String),

    #[error("No operation '{operation}' on target type '{target_type}'")]
    NoSuchOperation {
        target_type: String,
        operation: String,
    },

    #[error("Argument {index} is missing or is not of type '{expected}'")]
    ArgumentMismatch { index: usize, expected: &'static str },

    #[error("Cannot find current proxy: set 'expose_proxy' on the proxy configuration to make it available")]
    ProxyNotExposed,
}

fn negation(bound: &bool) -> &'static str {
    if *bound {
        ""
    } else {
        " NOT"
    }
}

impl InvocationError {
    /// 将任意错误包装为故障
    pub fn thrown<E: Error + Send + Sync + 'static>(error: E) -> Self {
        InvocationError::Thrown(Arc::new(error))
    }

    /// 若为目标/通知抛出的故障则返回之
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            InvocationError::Thrown(fault) => Some(fault),
            _ => None,
        }
    }

    /// 异常通知可以观察到的故障
    ///
    /// 抛出的故障原样返回；目标方法返回的其他错误（找不到操作、参数类型不符等）包装为故障；
    /// 配置错误、绑定不一致与内部一致性错误返回 `None`
    pub fn observable_fault(&self) -> Option<Fault> {
        match self {
            InvocationError::Thrown(fault) => Some(fault.clone()),
            InvocationError::Configuration(_)
            | InvocationError::BindingMismatch { .. }
            | InvocationError::Internal(_)
            | InvocationError::NullReturn(_) => None,
            other => Some(Arc::new(other.clone())),
        }
    }

    /// 是否不是由目标方法或通知直接抛出的故障
    pub fn is_framework_fault(&self) -> bool {
        !matches!(self, InvocationError::Thrown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("insufficient funds")]
    struct InsufficientFunds;

    #[test]
    fn test_thrown_keeps_fault_identity() {
        let fault: Fault = Arc::new(InsufficientFunds);
        let error = InvocationError::Thrown(fault.clone());

        let carried = error.fault().unwrap();
        assert!(Arc::ptr_eq(carried, &fault));
        assert_eq!(error.to_string(), "insufficient funds");
        assert!(!error.is_framework_fault());
    }

    #[test]
    fn test_binding_mismatch_message() {
        let error = InvocationError::BindingMismatch {
            required: 3,
            bound: 2,
            join_point_match_bound: false,
        };
        assert_eq!(
            error.to_string(),
            "Required to bind 3 arguments, but only bound 2 (JoinPointMatch was NOT bound in invocation)"
        );
        assert!(error.is_framework_fault());
        assert!(error.observable_fault().is_none());
    }

    #[test]
    fn test_observable_fault() {
        let fault: Fault = Arc::new(InsufficientFunds);
        let thrown = InvocationError::Thrown(fault.clone());
        assert!(Arc::ptr_eq(&thrown.observable_fault().unwrap(), &fault));

        let mismatch = InvocationError::ArgumentMismatch {
            index: 0,
            expected: "i64",
        };
        let wrapped = mismatch.observable_fault().unwrap();
        assert!(wrapped.is::<InvocationError>());
        assert_eq!(wrapped.to_string(), "Argument 0 is missing or is not of type 'i64'");

        assert!(InvocationError::Internal("lost".into()).observable_fault().is_none());
        assert!(InvocationError::from(AopConfigError::Frozen).observable_fault().is_none());
    }
}
