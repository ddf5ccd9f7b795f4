//! 通知（Advice）定义
//!
//! 通知是一组封闭的变体：前置、返回后、后置、异常、环绕以及原始拦截器。
//! 注册时由 [`AdvisorAdapterRegistry`](crate::AdvisorAdapterRegistry) 统一转换为
//! [`MethodInterceptor`]，调用链只与拦截器打交道。

use crate::error::{Fault, InvocationError};
use crate::invocation::MethodInvocation;
use crate::operation::{InvocationResult, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 统一的拦截器能力
///
/// 拦截器通过是否调用 [`MethodInvocation::proceed`] 决定下游是否执行
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult;

    /// 拦截器名称，用于日志
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 前置通知：在目标方法执行前调用
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, invocation: &MethodInvocation) -> Result<(), InvocationError>;
}

/// 返回后通知：目标方法正常返回后调用
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        return_value: Option<&Value>,
        invocation: &MethodInvocation,
    ) -> Result<(), InvocationError>;
}

/// 后置通知：无论成功还是失败都执行
pub trait AfterAdvice: Send + Sync {
    fn after(&self, invocation: &MethodInvocation) -> Result<(), InvocationError>;
}

/// 异常通知：目标方法或下游通知抛出故障时调用，故障随后原样重新抛出
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(&self, fault: &Fault, invocation: &MethodInvocation)
        -> Result<(), InvocationError>;
}

/// 环绕通知：完全控制目标方法的执行
pub trait AroundAdvice: Send + Sync {
    fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult;
}

/// 通知类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 原始拦截器
    Interceptor,
    /// 由外部适配器支持的扩展类型
    Custom(&'static str),
}

impl AdviceType {
    /// 前置类通知
    pub fn is_before(&self) -> bool {
        matches!(self, AdviceType::Before)
    }

    /// 后置类通知（after / after-returning / after-throwing）
    pub fn is_after(&self) -> bool {
        matches!(
            self,
            AdviceType::After | AdviceType::AfterReturning | AdviceType::AfterThrowing
        )
    }
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceType::Before => write!(f, "before"),
            AdviceType::After => write!(f, "after"),
            AdviceType::AfterReturning => write!(f, "after-returning"),
            AdviceType::AfterThrowing => write!(f, "after-throwing"),
            AdviceType::Around => write!(f, "around"),
            AdviceType::Interceptor => write!(f, "interceptor"),
            AdviceType::Custom(tag) => write!(f, "custom:{}", tag),
        }
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Around(Arc<dyn AroundAdvice>),
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 扩展通知，需要为 `tag` 注册适配器
    Custom {
        tag: &'static str,
        advice: Arc<dyn Any + Send + Sync>,
    },
}

impl Advice {
    pub fn before<A: BeforeAdvice + 'static>(advice: A) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning<A: AfterReturningAdvice + 'static>(advice: A) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after<A: AfterAdvice + 'static>(advice: A) -> Self {
        Advice::After(Arc::new(advice))
    }

    pub fn after_throwing<A: AfterThrowingAdvice + 'static>(advice: A) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn around<A: AroundAdvice + 'static>(advice: A) -> Self {
        Advice::Around(Arc::new(advice))
    }

    pub fn interceptor<I: MethodInterceptor + 'static>(interceptor: I) -> Self {
        Advice::Interceptor(Arc::new(interceptor))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::After(_) => AdviceType::After,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::Around(_) => AdviceType::Around,
            Advice::Interceptor(_) => AdviceType::Interceptor,
            Advice::Custom { tag, .. } => AdviceType::Custom(tag),
        }
    }

    fn identity(&self) -> *const () {
        match self {
            Advice::Before(a) => Arc::as_ptr(a) as *const (),
            Advice::AfterReturning(a) => Arc::as_ptr(a) as *const (),
            Advice::After(a) => Arc::as_ptr(a) as *const (),
            Advice::AfterThrowing(a) => Arc::as_ptr(a) as *const (),
            Advice::Around(a) => Arc::as_ptr(a) as *const (),
            Advice::Interceptor(a) => Arc::as_ptr(a) as *const (),
            Advice::Custom { advice, .. } => Arc::as_ptr(advice) as *const (),
        }
    }

    /// 是否为同一个通知对象
    pub fn same_advice(&self, other: &Advice) -> bool {
        self.advice_type() == other.advice_type() && self.identity() == other.identity()
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("type", &self.advice_type())
            .field("identity", &self.identity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl BeforeAdvice for Noop {
        fn before(&self, _invocation: &MethodInvocation) -> Result<(), InvocationError> {
            Ok(())
        }
    }

    #[test]
    fn test_advice_type_classification() {
        assert!(AdviceType::Before.is_before());
        assert!(AdviceType::After.is_after());
        assert!(AdviceType::AfterReturning.is_after());
        assert!(AdviceType::AfterThrowing.is_after());
        assert!(!AdviceType::Around.is_after());
        assert!(!AdviceType::Around.is_before());
        assert_eq!(AdviceType::Custom("retry").to_string(), "custom:retry");
    }

    #[test]
    fn test_same_advice_is_identity() {
        let shared: Arc<dyn BeforeAdvice> = Arc::new(Noop);
        let a = Advice::Before(shared.clone());
        let b = Advice::Before(shared);
        let c = Advice::before(Noop);

        assert!(a.same_advice(&b));
        assert!(!a.same_advice(&c));
        assert_eq!(a.advice_type(), AdviceType::Before);
    }
}
