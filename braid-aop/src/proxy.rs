//! 代理调度
//!
//! 一次代理调用的完整流程：
//! 1. `Advised` 自省操作在本地处理（除非配置为 opaque）
//! 2. 按配置把代理发布到 [`AopContext`]，调用结束时恢复
//! 3. 从目标源获取目标，查找（或构建并缓存）拦截器链
//! 4. 链为空时直接调用真实操作，否则构造 [`MethodInvocation`] 并推进
//! 5. 处理返回值：目标返回自身时替换为代理；基础类型返回空值视为错误

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::Advice;
use crate::advisor::{Advisor, AdvisorKind};
use crate::chain::{AdvisorChainFactory, InterceptorChain};
use crate::config::ProxyConfig;
use crate::context::AopContext;
use crate::error::{AopConfigError, InvocationError};
use crate::invocation::MethodInvocation;
use crate::operation::{
    same_instance, value, InvocationResult, Operation, ReturnType, TargetInvoker, Value,
};
use crate::precedence::sort_by_precedence;
use crate::target::{EmptyTargetSource, SingletonTargetSource, TargetSource};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 自省接口的类型名
pub const ADVISED_TYPE: &str = "braid_aop::Advised";

/// 每个代理都支持的自省操作
pub mod advised {
    use super::ADVISED_TYPE;
    use crate::operation::{Operation, ReturnType};

    pub const ADVISOR_COUNT: Operation =
        Operation::new(ADVISED_TYPE, "advisor_count").returning(ReturnType::Primitive("usize"));
    pub const IS_FROZEN: Operation =
        Operation::new(ADVISED_TYPE, "is_frozen").returning(ReturnType::Primitive("bool"));
    pub const IS_EXPOSE_PROXY: Operation =
        Operation::new(ADVISED_TYPE, "is_expose_proxy").returning(ReturnType::Primitive("bool"));
    pub const IS_PRE_FILTERED: Operation =
        Operation::new(ADVISED_TYPE, "is_pre_filtered").returning(ReturnType::Primitive("bool"));
    pub const IS_OPAQUE: Operation =
        Operation::new(ADVISED_TYPE, "is_opaque").returning(ReturnType::Primitive("bool"));
    pub const PROXY_CONFIG: Operation =
        Operation::new(ADVISED_TYPE, "proxy_config").returning(ReturnType::Object("ProxyConfig"));
    pub const TARGET_TYPE: Operation =
        Operation::new(ADVISED_TYPE, "target_type").returning(ReturnType::Object("&str"));
    pub const INTERFACES: Operation = Operation::new(ADVISED_TYPE, "interfaces")
        .returning(ReturnType::Object("Vec<&str>"));
}

/// 一次调用所解析出的目标
#[derive(Clone)]
pub struct ResolvedTarget {
    pub instance: Option<Value>,
    pub target_type: &'static str,
    pub invoker: Arc<dyn TargetInvoker>,
}

/// 沿拦截器链调度一次调用
///
/// 链为空时直接调用真实操作，不创建调用游标。
/// 目标或通知抛出的故障原样返回。
pub fn dispatch(
    proxy: &Value,
    target: &ResolvedTarget,
    operation: &Operation,
    args: Vec<Value>,
    chain: &InterceptorChain,
) -> InvocationResult {
    if chain.is_empty() {
        return target
            .invoker
            .invoke(target.instance.as_ref(), operation, &args);
    }

    MethodInvocation::new(
        proxy.clone(),
        target.instance.clone(),
        *operation,
        args,
        target.target_type,
        chain.clone(),
        target.invoker.clone(),
    )
    .proceed()
}

type ChainKey = (Operation, &'static str);

/// 代理的可变配置：顾问列表、目标源与链缓存
pub struct AdvisedSupport {
    config: ProxyConfig,
    frozen: AtomicBool,
    advisors: RwLock<Vec<Advisor>>,
    target_source: Arc<dyn TargetSource>,
    invoker: Arc<dyn TargetInvoker>,
    interfaces: Vec<&'static str>,
    chain_factory: AdvisorChainFactory,
    chain_cache: RwLock<HashMap<ChainKey, InterceptorChain>>,
}

impl AdvisedSupport {
    /// 当前配置（`frozen` 反映运行期状态）
    pub fn config(&self) -> ProxyConfig {
        let mut config = self.config.clone();
        config.frozen = self.is_frozen();
        config
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// 冻结后不能再增删顾问
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn advisors(&self) -> Vec<Advisor> {
        self.advisors.read().clone()
    }

    pub fn advisor_count(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    pub fn target_type(&self) -> Option<&'static str> {
        self.target_source.target_type()
    }

    /// 代理实现的接口：显式声明的加上引入的
    pub fn interfaces(&self) -> Vec<&'static str> {
        let mut interfaces = self.interfaces.clone();
        for advisor in self.advisors.read().iter() {
            for &interface in advisor.interfaces() {
                if !interfaces.contains(&interface) {
                    interfaces.push(interface);
                }
            }
        }
        interfaces
    }

    /// 添加顾问
    ///
    /// 通知无法适配时拒绝添加；按配置重新排序并清空链缓存。
    pub fn add_advisor(&self, advisor: Advisor) -> Result<(), AopConfigError> {
        self.check_not_frozen()?;
        self.chain_factory.registry().interceptors(&advisor)?;

        let mut advisors = self.advisors.write();
        advisors.push(advisor);
        if self.config.sort_by_precedence {
            *advisors = sort_by_precedence(std::mem::take(&mut *advisors));
        }
        self.chain_cache.write().clear();
        tracing::debug!(advisors = advisors.len(), "Advisor added, chain cache cleared");
        Ok(())
    }

    /// 添加作用于所有操作的通知
    pub fn add_advice(&self, advice: Advice) -> Result<(), AopConfigError> {
        let advisor = self.chain_factory.registry().wrap(advice)?;
        self.add_advisor(advisor)
    }

    /// 按通知身份移除顾问，返回是否移除
    pub fn remove_advisor(&self, advisor: &Advisor) -> Result<bool, AopConfigError> {
        self.check_not_frozen()?;

        let mut advisors = self.advisors.write();
        let Some(index) = advisors.iter().position(|existing| existing == advisor) else {
            return Ok(false);
        };
        advisors.remove(index);
        self.chain_cache.write().clear();
        tracing::debug!(advisors = advisors.len(), "Advisor removed, chain cache cleared");
        Ok(true)
    }

    /// 查找拦截器链，按配置缓存
    pub fn chain_for(
        &self,
        operation: &Operation,
        target_type: &'static str,
    ) -> Result<InterceptorChain, AopConfigError> {
        let key = (*operation, target_type);
        if self.config.cache_chains {
            if let Some(chain) = self.chain_cache.read().get(&key) {
                return Ok(chain.clone());
            }
        }

        // 持有读锁直到写入缓存，避免与顾问变更交错写入过期链
        let advisors = self.advisors.read();
        let chain = self.chain_factory.build(
            &advisors,
            operation,
            Some(target_type),
            self.config.pre_filtered,
        )?;
        if self.config.cache_chains {
            self.chain_cache.write().insert(key, chain.clone());
        }
        Ok(chain)
    }

    fn check_not_frozen(&self) -> Result<(), AopConfigError> {
        if self.is_frozen() {
            return Err(AopConfigError::Frozen);
        }
        Ok(())
    }

    fn introspect(&self, operation: &Operation) -> InvocationResult {
        let result = match operation.name() {
            "advisor_count" => value(self.advisor_count()),
            "is_frozen" => value(self.is_frozen()),
            "is_expose_proxy" => value(self.config.expose_proxy),
            "is_pre_filtered" => value(self.config.pre_filtered),
            "is_opaque" => value(self.config.opaque),
            "proxy_config" => value(self.config()),
            "target_type" => return Ok(self.target_type().map(value)),
            "interfaces" => value(self.interfaces()),
            other => {
                return Err(InvocationError::NoSuchOperation {
                    target_type: ADVISED_TYPE.to_string(),
                    operation: other.to_string(),
                })
            }
        };
        Ok(Some(result))
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisedSupport")
            .field("config", &self.config())
            .field("target_type", &self.target_type())
            .field("advisors", &*self.advisors.read())
            .finish()
    }
}

/// AOP 代理
pub struct AopProxy {
    advised: AdvisedSupport,
}

impl AopProxy {
    pub fn advised(&self) -> &AdvisedSupport {
        &self.advised
    }

    /// 通过代理调用操作
    pub fn invoke(self: &Arc<Self>, operation: &Operation, args: Vec<Value>) -> InvocationResult {
        let advised = &self.advised;
        if !advised.config.opaque && operation.declaring_type() == ADVISED_TYPE {
            return advised.introspect(operation);
        }

        let proxy: Value = self.clone();
        let _exposure = advised
            .config
            .expose_proxy
            .then(|| AopContext::expose(proxy.clone()));

        let source = &advised.target_source;
        let target = ResolvedTarget {
            instance: source.get_target()?,
            target_type: source
                .target_type()
                .unwrap_or_else(|| operation.declaring_type()),
            invoker: advised.invoker.clone(),
        };

        let result = advised
            .chain_for(operation, target.target_type)
            .map_err(InvocationError::from)
            .and_then(|chain| dispatch(&proxy, &target, operation, args, &chain))
            .and_then(|returned| {
                substitute_return(operation, &proxy, target.instance.as_ref(), returned)
            });

        if !source.is_static() {
            source.release_target(target.instance);
        }
        result
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("advised", &self.advised)
            .finish()
    }
}

fn substitute_return(
    operation: &Operation,
    proxy: &Value,
    target: Option<&Value>,
    returned: Option<Value>,
) -> InvocationResult {
    match (returned, operation.return_type()) {
        (Some(returned), ReturnType::Proxyable(_))
            if target.is_some_and(|target| same_instance(&returned, target)) =>
        {
            Ok(Some(proxy.clone()))
        }
        (None, ReturnType::Primitive(_)) => Err(InvocationError::NullReturn(operation.signature())),
        (returned, _) => Ok(returned),
    }
}

/// 没有目标时的调用器：所有未被拦截器处理的操作都不存在
struct NoTargetInvoker;

impl TargetInvoker for NoTargetInvoker {
    fn invoke(&self, _target: Option<&Value>, operation: &Operation, _args: &[Value]) -> InvocationResult {
        Err(InvocationError::NoSuchOperation {
            target_type: operation.declaring_type().to_string(),
            operation: operation.name().to_string(),
        })
    }
}

/// 代理工厂
///
/// ```
/// use braid_aop::{value, MethodTable, Operation, ProxyConfig, ProxyFactory, ReturnType};
///
/// struct Greeter;
///
/// const GREET: Operation = Operation::new("Greeter", "greet")
///     .returning(ReturnType::Object("String"));
///
/// let proxy = ProxyFactory::new()
///     .with_config(ProxyConfig::new().expose_proxy(true))
///     .with_target(value(Greeter), "Greeter")
///     .with_invoker(MethodTable::<Greeter>::new()
///         .operation("greet", |_, _| Ok(Some(value(String::from("hello"))))))
///     .build()
///     .unwrap();
///
/// let greeting = proxy.invoke(&GREET, vec![]).unwrap().unwrap();
/// assert_eq!(greeting.downcast_ref::<String>().unwrap(), "hello");
/// ```
#[derive(Default)]
pub struct ProxyFactory {
    config: ProxyConfig,
    target_source: Option<Arc<dyn TargetSource>>,
    invoker: Option<Arc<dyn TargetInvoker>>,
    interfaces: Vec<&'static str>,
    advisors: Vec<Advisor>,
    registry: Option<Arc<AdvisorAdapterRegistry>>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// 单例目标
    pub fn with_target(self, target: Value, target_type: &'static str) -> Self {
        self.with_target_source(SingletonTargetSource::new(target, target_type))
    }

    pub fn with_target_source<S: TargetSource + 'static>(mut self, source: S) -> Self {
        self.target_source = Some(Arc::new(source));
        self
    }

    pub fn with_invoker<I: TargetInvoker + 'static>(mut self, invoker: I) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn with_shared_invoker(mut self, invoker: Arc<dyn TargetInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_interface(mut self, interface: &'static str) -> Self {
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    pub fn add_advisor(mut self, advisor: Advisor) -> Self {
        self.advisors.push(advisor);
        self
    }

    /// 作用于所有操作的通知
    pub fn add_advice(self, advice: Advice) -> Self {
        self.add_advisor(Advisor::global(advice))
    }

    pub fn with_adapter_registry(mut self, registry: Arc<AdvisorAdapterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 校验所有通知都能被适配，按配置排序后创建代理
    pub fn build(self) -> Result<Arc<AopProxy>, AopConfigError> {
        let registry = self
            .registry
            .unwrap_or_else(|| AdvisorAdapterRegistry::global().clone());

        for advisor in &self.advisors {
            registry.interceptors(advisor)?;
        }

        let (target_source, invoker): (Arc<dyn TargetSource>, Arc<dyn TargetInvoker>) =
            match (self.target_source, self.invoker) {
                (Some(source), Some(invoker)) => (source, invoker),
                (None, Some(invoker)) => (Arc::new(EmptyTargetSource::new()), invoker),
                (None, None) => (Arc::new(EmptyTargetSource::new()), Arc::new(NoTargetInvoker)),
                (Some(source), None) => {
                    return Err(AopConfigError::InvalidProxy(format!(
                        "target of type '{}' has no invoker",
                        source.target_type().unwrap_or("<unknown>")
                    )))
                }
            };

        let advisors = if self.config.sort_by_precedence {
            sort_by_precedence(self.advisors)
        } else {
            self.advisors
        };

        let introductions = advisors
            .iter()
            .filter(|advisor| matches!(advisor.kind(), AdvisorKind::Introduction { .. }))
            .count();
        tracing::debug!(
            target_type = target_source.target_type().unwrap_or("<none>"),
            advisors = advisors.len(),
            introductions,
            expose_proxy = self.config.expose_proxy,
            "Creating AOP proxy"
        );

        let frozen = AtomicBool::new(self.config.frozen);
        Ok(Arc::new(AopProxy {
            advised: AdvisedSupport {
                config: self.config,
                frozen,
                advisors: RwLock::new(advisors),
                target_source,
                invoker,
                interfaces: self.interfaces,
                chain_factory: AdvisorChainFactory::new(registry),
                chain_cache: RwLock::new(HashMap::new()),
            },
        }))
    }
}
