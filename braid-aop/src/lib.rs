//! Braid AOP - 切面组合与拦截调度引擎
//!
//! 提供：
//! - 通知器（切点 + 通知）与按优先级排序的拦截器链
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing）及可扩展的适配器
//! - 切面式通知声明的参数绑定（连接点、切点变量、返回值、抛出的故障）
//! - 代理调度：自省、代理暴露、目标源、返回值替换
//! - 引入（Introduction），包括按目标对象划分的委托
//!
//! ```
//! use braid_aop::prelude::*;
//! use braid_aop::{value, MethodTable};
//!
//! struct Calculator;
//!
//! const ADD: Operation = Operation::new("Calculator", "add")
//!     .with_parameters(&["i64", "i64"])
//!     .returning(ReturnType::Primitive("i64"));
//!
//! let proxy = ProxyFactory::new()
//!     .with_target(value(Calculator), "Calculator")
//!     .with_invoker(MethodTable::<Calculator>::new().operation("add", |_, args| {
//!         Ok(Some(value(braid_aop::argument::<i64>(args, 0)? + braid_aop::argument::<i64>(args, 1)?)))
//!     }))
//!     .add_advice(Advice::interceptor(TracingInterceptor::new()))
//!     .build()
//!     .unwrap();
//!
//! let sum = proxy.invoke(&ADD, vec![value(2i64), value(3i64)]).unwrap().unwrap();
//! assert_eq!(sum.downcast_ref::<i64>(), Some(&5));
//! ```

extern crate self as braid_aop;

pub mod adapter;
pub mod advice;
pub mod advisor;
pub mod aspect;
pub mod binding;
pub mod chain;
pub mod config;
pub mod context;
pub mod declaration;
pub mod discoverer;
pub mod error;
pub mod interceptors;
pub mod introduction;
pub mod invocation;
pub mod joinpoint;
pub mod logging;
pub mod operation;
pub mod pointcut;
pub mod precedence;
pub mod proxy;
pub mod registry;
pub mod target;

#[cfg(test)]
mod testing;

// 重新导出核心类型
pub use adapter::{AdvisorAdapter, AdvisorAdapterRegistry};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice,
    BeforeAdvice, MethodInterceptor,
};
pub use advisor::{Advisor, AdvisorKind, PrecedenceKey, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
pub use aspect::{Aspect, AspectRegistration};
pub use binding::{bind_arguments, AdviceArgument, ArgumentBinding, BindingSlot};
pub use chain::{AdvisorChainFactory, ChainElement, InterceptorChain};
pub use config::ProxyConfig;
pub use context::AopContext;
pub use declaration::{AdviceDeclaration, AdviceMethod, ParameterType};
pub use discoverer::{default_discoverer, ParameterNameDiscoverer, ParameterNameRegistration};
pub use error::{AopConfigError, Fault, InvocationError};
pub use interceptors::{FaultInfo, PerformanceMonitorInterceptor, TracingInterceptor};
pub use introduction::{
    DelegatePerTargetObjectIntroductionInterceptor, DelegatingIntroductionInterceptor, TargetId,
};
pub use invocation::MethodInvocation;
pub use joinpoint::{JoinPoint, ProceedingJoinPoint, StaticPart};
pub use operation::{
    argument, same_instance, value, InvocationResult, MethodTable, Operation, ReturnType,
    TargetInvoker, Value,
};
pub use pointcut::{
    ClassFilter, ExpressionPointcut, JoinPointMatch, MethodMatcher, Pointcut, PointcutExpression,
    TruePointcut,
};
pub use precedence::{sort_by_precedence, PrecedenceComparator};
pub use proxy::{dispatch, AdvisedSupport, AopProxy, ProxyFactory, ResolvedTarget};
pub use registry::{get_global_registry, AspectRegistry};
pub use target::{EmptyTargetSource, SingletonTargetSource, TargetSource};

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advisor::Advisor;
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::binding::AdviceArgument;
    pub use crate::config::ProxyConfig;
    pub use crate::context::AopContext;
    pub use crate::declaration::{AdviceDeclaration, ParameterType};
    pub use crate::error::{AopConfigError, InvocationError};
    pub use crate::interceptors::{PerformanceMonitorInterceptor, TracingInterceptor};
    pub use crate::invocation::MethodInvocation;
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::operation::{InvocationResult, Operation, ReturnType, Value};
    pub use crate::pointcut::{ExpressionPointcut, Pointcut, PointcutExpression};
    pub use crate::proxy::{AopProxy, ProxyFactory};
    pub use crate::registry::{get_global_registry, AspectRegistry};
    pub use crate::advice_key;
}

/// 通知函数的登记键，与 `#[advice]` 宏登记时使用的键一致
///
/// 必须在通知函数所在的模块中使用：
/// ```
/// fn log_call() {}
///
/// let key = braid_aop::advice_key!(log_call);
/// assert!(key.ends_with("::log_call"));
/// ```
#[macro_export]
macro_rules! advice_key {
    ($function:ident) => {
        concat!(module_path!(), "::", stringify!($function))
    };
}
