//! 通知适配
//!
//! 将各种通知统一转换为 [`MethodInterceptor`]，调用链只与拦截器打交道。
//! 适配表以 [`AdviceType`] 为键，扩展类型通过 [`AdvisorAdapterRegistry::register_adapter`] 接入。

use crate::advice::{
    AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice, Advice, AdviceType,
    BeforeAdvice, MethodInterceptor,
};
use crate::advisor::Advisor;
use crate::error::{AopConfigError, InvocationError};
use crate::invocation::MethodInvocation;
use crate::operation::InvocationResult;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// 通知适配器
pub trait AdvisorAdapter: Send + Sync {
    fn supports(&self, advice: &Advice) -> bool;

    fn interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError>;
}

/// 前置通知拦截器
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl BeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.advice.before(invocation)?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let return_value = invocation.proceed()?;
        self.advice.after_returning(return_value.as_ref(), invocation)?;
        Ok(return_value)
    }
}

/// 后置通知拦截器：无论下游成功还是失败都执行
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let result = invocation.proceed();
        self.advice.after(invocation)?;
        result
    }
}

/// 异常通知拦截器：通知执行后原样返回同一个错误
///
/// 目标方法返回的调用错误同样触发通知，见 [`InvocationError::observable_fault`]
pub struct AfterThrowingAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl AfterThrowingAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterThrowingAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let error = match invocation.proceed() {
            Err(error) => error,
            ok => return ok,
        };
        if let Some(fault) = error.observable_fault() {
            self.advice.after_throwing(&fault, invocation)?;
        }
        Err(error)
    }
}

/// 环绕通知拦截器
pub struct AroundAdviceInterceptor {
    advice: Arc<dyn AroundAdvice>,
}

impl AroundAdviceInterceptor {
    pub fn new(advice: Arc<dyn AroundAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AroundAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.advice.around(invocation)
    }
}

/// 内置通知类型的适配器
#[derive(Debug, Clone, Copy)]
struct BuiltinAdviceAdapter;

impl AdvisorAdapter for BuiltinAdviceAdapter {
    fn supports(&self, advice: &Advice) -> bool {
        matches!(
            advice,
            Advice::Before(_)
                | Advice::AfterReturning(_)
                | Advice::After(_)
                | Advice::AfterThrowing(_)
                | Advice::Around(_)
        )
    }

    fn interceptor(&self, advice: &Advice) -> Result<Arc<dyn MethodInterceptor>, AopConfigError> {
        let interceptor: Arc<dyn MethodInterceptor> = match advice {
            Advice::Before(a) => Arc::new(BeforeAdviceInterceptor::new(a.clone())),
            Advice::AfterReturning(a) => Arc::new(AfterReturningAdviceInterceptor::new(a.clone())),
            Advice::After(a) => Arc::new(AfterAdviceInterceptor::new(a.clone())),
            Advice::AfterThrowing(a) => Arc::new(AfterThrowingAdviceInterceptor::new(a.clone())),
            Advice::Around(a) => Arc::new(AroundAdviceInterceptor::new(a.clone())),
            other => {
                return Err(AopConfigError::UnknownAdviceType(
                    other.advice_type().to_string(),
                ))
            }
        };
        Ok(interceptor)
    }
}

static GLOBAL_ADAPTER_REGISTRY: Lazy<Arc<AdvisorAdapterRegistry>> =
    Lazy::new(|| Arc::new(AdvisorAdapterRegistry::new()));

/// 通知适配注册表
pub struct AdvisorAdapterRegistry {
    adapters: RwLock<HashMap<AdviceType, Arc<dyn AdvisorAdapter>>>,
}

impl AdvisorAdapterRegistry {
    /// 创建包含内置适配器的注册表
    pub fn new() -> Self {
        let builtin: Arc<dyn AdvisorAdapter> = Arc::new(BuiltinAdviceAdapter);
        let adapters = [
            AdviceType::Before,
            AdviceType::AfterReturning,
            AdviceType::After,
            AdviceType::AfterThrowing,
            AdviceType::Around,
        ]
        .into_iter()
        .map(|advice_type| (advice_type, builtin.clone()))
        .collect();

        Self {
            adapters: RwLock::new(adapters),
        }
    }

    /// 进程级共享注册表
    pub fn global() -> &'static Arc<AdvisorAdapterRegistry> {
        &GLOBAL_ADAPTER_REGISTRY
    }

    /// 注册适配器，已有同类型适配器时替换
    pub fn register_adapter(&self, advice_type: AdviceType, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advisor adapter for '{}' advice", advice_type);
        self.adapters.write().insert(advice_type, adapter);
    }

    /// 将通知转换为拦截器
    pub fn interceptors_for(
        &self,
        advice: &Advice,
    ) -> Result<Vec<Arc<dyn MethodInterceptor>>, AopConfigError> {
        let mut interceptors = Vec::with_capacity(1);
        if let Advice::Interceptor(interceptor) = advice {
            interceptors.push(interceptor.clone());
        }

        let adapter = self.adapters.read().get(&advice.advice_type()).cloned();
        if let Some(adapter) = adapter.filter(|adapter| adapter.supports(advice)) {
            interceptors.push(adapter.interceptor(advice)?);
        }

        if interceptors.is_empty() {
            return Err(AopConfigError::UnknownAdviceType(
                advice.advice_type().to_string(),
            ));
        }
        Ok(interceptors)
    }

    /// 将通知器中的通知转换为拦截器
    pub fn interceptors(
        &self,
        advisor: &Advisor,
    ) -> Result<Vec<Arc<dyn MethodInterceptor>>, AopConfigError> {
        self.interceptors_for(advisor.advice())
    }

    /// 将裸通知包装为作用于所有操作的通知器
    pub fn wrap(&self, advice: Advice) -> Result<Advisor, AopConfigError> {
        self.interceptors_for(&advice)?;
        Ok(Advisor::global(advice))
    }

    /// 是否能适配该通知
    pub fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Interceptor(_))
            || self
                .adapters
                .read()
                .get(&advice.advice_type())
                .is_some_and(|adapter| adapter.supports(advice))
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
