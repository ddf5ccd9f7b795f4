//! 当前代理的可见性
//!
//! 开启 `expose_proxy` 后，代理在一次调用期间把自身发布到线程局部槽位，
//! 目标方法内部可以通过 [`AopContext::current_proxy`] 取回代理，从而让自调用也经过拦截器链。
//! 调用结束时由 [`ProxyExposure`] 恢复之前的值，因此嵌套调用互不干扰。
//!
//! 把工作交给其他 tokio 任务时，用 [`AopContext::scope`] 把代理带到任务局部槽位。

use crate::error::InvocationError;
use crate::operation::Value;
use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Value>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_PROXY: Value;
}

/// 当前代理的访问入口
pub struct AopContext;

impl AopContext {
    /// 当前调用发布的代理；先查线程局部槽位，再查任务局部槽位
    pub fn current_proxy() -> Result<Value, InvocationError> {
        CURRENT_PROXY
            .with(|slot| slot.borrow().clone())
            .or_else(|| TASK_PROXY.try_with(Clone::clone).ok())
            .ok_or(InvocationError::ProxyNotExposed)
    }

    /// 按具体类型取回当前代理
    pub fn current_proxy_as<T: Any + Send + Sync>() -> Result<Arc<T>, InvocationError> {
        Self::current_proxy()?.downcast::<T>().map_err(|_| {
            InvocationError::Internal(format!(
                "current proxy is not an instance of {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// 在任务局部槽位中发布代理并执行 future
    pub async fn scope<F>(proxy: Value, future: F) -> F::Output
    where
        F: Future,
    {
        TASK_PROXY.scope(proxy, future).await
    }

    /// 发布代理，返回的守卫在释放时恢复之前的值
    pub fn expose(proxy: Value) -> ProxyExposure {
        let previous = CURRENT_PROXY.with(|slot| slot.borrow_mut().replace(proxy));
        ProxyExposure { previous }
    }
}

/// 代理发布守卫
#[must_use = "the proxy is only exposed while the guard is alive"]
pub struct ProxyExposure {
    previous: Option<Value>,
}

impl Drop for ProxyExposure {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|slot| *slot.borrow_mut() = previous);
    }
}
