//! 引入（Introduction）
//!
//! 让代理额外实现目标本身没有的接口：声明类型属于引入接口的操作交给委托对象执行，
//! 其余操作沿链继续。

use crate::advice::MethodInterceptor;
use crate::advisor::Advisor;
use crate::invocation::MethodInvocation;
use crate::operation::{same_instance, InvocationResult, TargetInvoker, Value};
use crate::pointcut::ClassFilter;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// 目标对象的身份，按实例地址区分
///
/// 地址只在目标存活期间唯一，委托表另外保存目标的弱引用来判断记录是否仍然有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

impl TargetId {
    pub fn of(target: &Value) -> Self {
        TargetId(Arc::as_ptr(target) as *const () as usize)
    }
}

fn invoke_delegate(
    delegate: &Value,
    invoker: &dyn TargetInvoker,
    invocation: &MethodInvocation,
) -> InvocationResult {
    let returned = invoker.invoke(Some(delegate), invocation.operation(), invocation.arguments())?;
    // 委托返回自身时对外暴露代理
    match returned {
        Some(returned) if same_instance(&returned, delegate) => Ok(Some(invocation.proxy().clone())),
        other => Ok(other),
    }
}

/// 所有目标共享同一个委托对象的引入拦截器
pub struct DelegatingIntroductionInterceptor {
    delegate: Value,
    invoker: Arc<dyn TargetInvoker>,
    interfaces: Vec<&'static str>,
}

impl DelegatingIntroductionInterceptor {
    pub fn new<I: TargetInvoker + 'static>(
        delegate: Value,
        invoker: I,
        interfaces: Vec<&'static str>,
    ) -> Self {
        Self {
            delegate,
            invoker: Arc::new(invoker),
            interfaces,
        }
    }

    pub fn interfaces(&self) -> &[&'static str] {
        &self.interfaces
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|candidate| *candidate == interface)
    }

    /// 包装为引入通知器
    pub fn into_advisor(self, class_filter: Arc<dyn ClassFilter>) -> Advisor {
        let interfaces = self.interfaces.clone();
        Advisor::introduction(class_filter, interfaces, Arc::new(self))
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        if self.implements(invocation.operation().declaring_type()) {
            tracing::trace!(operation = %invocation.operation().signature(), "delegating introduced operation");
            return invoke_delegate(&self.delegate, self.invoker.as_ref(), invocation);
        }
        invocation.proceed()
    }

    fn name(&self) -> &str {
        "DelegatingIntroductionInterceptor"
    }
}

type DelegateFactory = Arc<dyn Fn() -> Value + Send + Sync>;

struct DelegateEntry {
    owner: Weak<dyn Any + Send + Sync>,
    delegate: Value,
}

impl DelegateEntry {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// 每个目标对象拥有独立委托的引入拦截器
///
/// 委托在目标第一次调用引入操作时创建，直到 [`release`](Self::release) 才会移除。
/// 目标被释放后其委托不再可见，并在下一次创建委托时清理。
pub struct DelegatePerTargetObjectIntroductionInterceptor {
    factory: DelegateFactory,
    invoker: Arc<dyn TargetInvoker>,
    interfaces: Vec<&'static str>,
    delegates: RwLock<HashMap<TargetId, DelegateEntry>>,
}

impl DelegatePerTargetObjectIntroductionInterceptor {
    pub fn new<F, I>(factory: F, invoker: I, interfaces: Vec<&'static str>) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
        I: TargetInvoker + 'static,
    {
        Self {
            factory: Arc::new(factory),
            invoker: Arc::new(invoker),
            interfaces,
            delegates: RwLock::new(HashMap::new()),
        }
    }

    pub fn interfaces(&self) -> &[&'static str] {
        &self.interfaces
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|candidate| *candidate == interface)
    }

    /// 存活目标对应的委托，没有时返回空
    pub fn delegate_for(&self, target: TargetId) -> Option<Value> {
        self.delegates
            .read()
            .get(&target)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.delegate.clone())
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.read().values().filter(|entry| entry.is_live()).count()
    }

    /// 移除目标的委托，返回被移除的委托
    pub fn release(&self, target: TargetId) -> Option<Value> {
        let released = self.delegates.write().remove(&target).map(|entry| entry.delegate);
        if released.is_some() {
            tracing::debug!(?target, "Released introduction delegate");
        }
        released
    }

    fn delegate(&self, owner: &Value) -> Value {
        let id = TargetId::of(owner);
        if let Some(delegate) = self.delegate_for(id) {
            return delegate;
        }

        let mut delegates = self.delegates.write();
        delegates.retain(|_, entry| entry.is_live());
        delegates
            .entry(id)
            .or_insert_with(|| DelegateEntry {
                owner: Arc::downgrade(owner),
                delegate: (self.factory)(),
            })
            .delegate
            .clone()
    }
}

impl MethodInterceptor for DelegatePerTargetObjectIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        if !self.implements(invocation.operation().declaring_type()) {
            return invocation.proceed();
        }

        // 没有目标时以代理本身区分
        let owner = invocation.target().unwrap_or_else(|| invocation.proxy());
        let delegate = self.delegate(owner);
        invoke_delegate(&delegate, self.invoker.as_ref(), invocation)
    }

    fn name(&self) -> &str {
        "DelegatePerTargetObjectIntroductionInterceptor"
    }
}
