//! 方法调用（调用链游标）
//!
//! [`MethodInvocation`] 既是一次调用的上下文（连接点），也是遍历拦截器链的游标。
//! 每个拦截器拿到 `&mut MethodInvocation`，通过调用 [`proceed`](MethodInvocation::proceed)
//! 递归地推进到下一个拦截器，链尾调用真实操作。

use crate::chain::{ChainElement, InterceptorChain};
use crate::operation::{InvocationResult, Operation, TargetInvoker, Value};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Attributes = Arc<Mutex<HashMap<String, Value>>>;

/// 一次进行中的调用
///
/// 单次使用、由调用线程独占。需要移交到其他线程时，转移整个对象或其
/// [`invocable_clone`](Self::invocable_clone)。
pub struct MethodInvocation {
    proxy: Value,
    target: Option<Value>,
    operation: Operation,
    arguments: Vec<Value>,
    target_type: &'static str,
    chain: InterceptorChain,
    invoker: Arc<dyn TargetInvoker>,
    /// 已消费的链元素个数，只增不减
    consumed: usize,
    /// 拦截器之间共享数据的附加表，首次使用时创建
    attributes: OnceCell<Attributes>,
}

impl MethodInvocation {
    pub fn new(
        proxy: Value,
        target: Option<Value>,
        operation: Operation,
        arguments: Vec<Value>,
        target_type: &'static str,
        chain: InterceptorChain,
        invoker: Arc<dyn TargetInvoker>,
    ) -> Self {
        Self {
            proxy,
            target,
            operation,
            arguments,
            target_type,
            chain,
            invoker,
            consumed: 0,
            attributes: OnceCell::new(),
        }
    }

    /// 推进到链上的下一个拦截器；链已耗尽时调用真实操作
    ///
    /// 到达终态后再次调用会重新执行真实操作。
    /// 任何故障都原样返回给调用者，不做转换。
    pub fn proceed(&mut self) -> InvocationResult {
        if self.consumed == self.chain.len() {
            tracing::trace!(operation = %self.operation.signature(), "invoking join point");
            return self.invoke_join_point();
        }

        let chain = self.chain.clone();
        let index = self.consumed;
        self.consumed += 1;

        match chain.get(index) {
            Some(ChainElement::Dynamic {
                interceptor,
                matcher,
            }) => {
                if matcher.matches_runtime(&self.operation, self.target_type, &self.arguments) {
                    tracing::trace!(index, interceptor = interceptor.name(), "dynamic match");
                    interceptor.invoke(self)
                } else {
                    tracing::trace!(index, interceptor = interceptor.name(), "dynamic match failed, skipping");
                    self.proceed()
                }
            }
            Some(ChainElement::Interceptor(interceptor)) => {
                tracing::trace!(index, interceptor = interceptor.name(), "invoking interceptor");
                interceptor.invoke(self)
            }
            None => self.invoke_join_point(),
        }
    }

    fn invoke_join_point(&self) -> InvocationResult {
        self.invoker
            .invoke(self.target.as_ref(), &self.operation, &self.arguments)
    }

    /// 代理对象
    pub fn proxy(&self) -> &Value {
        &self.proxy
    }

    /// 目标对象（可能为空）
    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// 替换参数，后续拦截器与真实操作都将看到新参数
    pub fn set_arguments(&mut self, arguments: Vec<Value>) {
        self.arguments = arguments;
    }

    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// 当前游标位置：已消费的链元素个数
    pub fn position(&self) -> usize {
        self.consumed
    }

    fn attribute_table(&self) -> &Attributes {
        self.attributes.get_or_init(Attributes::default)
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get()?.lock().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        self.attribute_table().lock().insert(key.into(), value);
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get()?.lock().remove(key)
    }

    /// 读取附加表中的值，不存在时计算并存入
    pub fn attribute_or_insert_with<F>(&self, key: &str, init: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        self.attribute_table()
            .lock()
            .entry(key.to_string())
            .or_insert_with(init)
            .clone()
    }

    /// 克隆出一个可独立继续执行的调用
    ///
    /// 克隆拥有独立的参数，保持相同的游标位置，共享拦截器链；
    /// 若附加表已创建则共享同一张表。
    pub fn invocable_clone(&self) -> MethodInvocation {
        self.invocable_clone_with(self.arguments.clone())
    }

    /// 以新的参数克隆调用
    pub fn invocable_clone_with(&self, arguments: Vec<Value>) -> MethodInvocation {
        let attributes = OnceCell::new();
        if let Some(shared) = self.attributes.get() {
            let _ = attributes.set(shared.clone());
        }
        MethodInvocation {
            proxy: self.proxy.clone(),
            target: self.target.clone(),
            operation: self.operation,
            arguments,
            target_type: self.target_type,
            chain: self.chain.clone(),
            invoker: self.invoker.clone(),
            consumed: self.consumed,
            attributes,
        }
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("operation", &self.operation.signature())
            .field("target_type", &self.target_type)
            .field("arguments", &self.arguments.len())
            .field("position", &self.consumed)
            .field("chain_length", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::MethodInterceptor;
    use crate::error::InvocationError;
    use crate::operation::value;
    use crate::pointcut::MethodMatcher;
    use crate::testing::{
        calculator_invoker, new_invocation, CountingInvoker, Recorder, RecordingInterceptor,
        ADD, CALCULATOR,
    };

    struct NeverMatches;

    impl MethodMatcher for NeverMatches {
        fn matches(&self, _operation: &Operation, _target_type: &str) -> bool {
            true
        }

        fn is_runtime(&self) -> bool {
            true
        }

        fn matches_runtime(&self, _: &Operation, _: &str, _: &[Value]) -> bool {
            false
        }
    }

    struct ShortCircuit;

    impl MethodInterceptor for ShortCircuit {
        fn invoke(&self, _invocation: &mut MethodInvocation) -> InvocationResult {
            Ok(Some(value(-1i64)))
        }
    }

    struct DoubleProceed;

    impl MethodInterceptor for DoubleProceed {
        fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
            invocation.proceed()?;
            invocation.proceed()
        }
    }

    #[test]
    fn test_proceed_runs_interceptors_in_order() {
        let recorder = Recorder::default();
        let chain = InterceptorChain::new(vec![
            ChainElement::interceptor(RecordingInterceptor::new("a", &recorder)),
            ChainElement::interceptor(RecordingInterceptor::new("b", &recorder)),
        ]);
        let mut invocation = new_invocation(chain, calculator_invoker(), vec![value(2i64), value(3i64)]);

        let result = invocation.proceed().unwrap().unwrap();
        assert_eq!(result.downcast_ref::<i64>(), Some(&5));
        assert_eq!(recorder.events(), vec!["a:enter", "b:enter", "b:exit", "a:exit"]);
        assert_eq!(invocation.position(), 2);
    }

    #[test]
    fn test_dynamic_rematch_skip() {
        let recorder = Recorder::default();
        let counting = Arc::new(CountingInvoker::new(calculator_invoker()));
        let chain = InterceptorChain::new(vec![
            ChainElement::interceptor(RecordingInterceptor::new("static", &recorder)),
            ChainElement::dynamic(
                Arc::new(RecordingInterceptor::new("dynamic", &recorder)),
                Arc::new(NeverMatches),
            ),
        ]);
        let mut invocation = new_invocation(chain, counting.clone(), vec![value(1i64), value(1i64)]);

        invocation.proceed().unwrap();
        assert_eq!(recorder.events(), vec!["static:enter", "static:exit"]);
        assert_eq!(counting.count(), 1);
    }

    #[test]
    fn test_interceptor_can_short_circuit() {
        let counting = Arc::new(CountingInvoker::new(calculator_invoker()));
        let chain = InterceptorChain::new(vec![ChainElement::interceptor(ShortCircuit)]);
        let mut invocation = new_invocation(chain, counting.clone(), vec![value(1i64), value(1i64)]);

        let result = invocation.proceed().unwrap().unwrap();
        assert_eq!(result.downcast_ref::<i64>(), Some(&-1));
        assert_eq!(counting.count(), 0);
    }

    #[test]
    fn test_terminal_state_reinvokes_target() {
        let counting = Arc::new(CountingInvoker::new(calculator_invoker()));
        let chain = InterceptorChain::new(vec![ChainElement::interceptor(DoubleProceed)]);
        let mut invocation = new_invocation(chain, counting.clone(), vec![value(1i64), value(1i64)]);

        invocation.proceed().unwrap();
        assert_eq!(counting.count(), 2);
        assert_eq!(invocation.position(), 1);
    }

    #[test]
    fn test_fault_passes_through_unchanged() {
        let recorder = Recorder::default();
        let chain = InterceptorChain::new(vec![ChainElement::interceptor(
            RecordingInterceptor::new("a", &recorder),
        )]);
        // 除数为 0 时计算器抛出故障
        let divide = Operation::new(CALCULATOR, "divide");
        let mut invocation = MethodInvocation::new(
            value(()),
            Some(value(crate::testing::Calculator)),
            divide,
            vec![value(1i64), value(0i64)],
            CALCULATOR,
            chain,
            calculator_invoker(),
        );

        let err = invocation.proceed().unwrap_err();
        assert!(matches!(err, InvocationError::Thrown(_)));
        assert_eq!(recorder.events(), vec!["a:enter", "a:fault"]);
    }

    #[test]
    fn test_attributes_are_lazy_and_shared_with_clones() {
        let invocation = new_invocation(InterceptorChain::empty(), calculator_invoker(), vec![]);
        assert!(invocation.attribute("k").is_none());

        invocation.set_attribute("k", value(1u8));
        let clone = invocation.invocable_clone();
        clone.set_attribute("shared", value(2u8));

        assert_eq!(invocation.attribute("shared").unwrap().downcast_ref::<u8>(), Some(&2));
        assert_eq!(invocation.remove_attribute("k").unwrap().downcast_ref::<u8>(), Some(&1));
        assert!(clone.attribute("k").is_none());
    }

    #[test]
    fn test_clone_has_independent_arguments() {
        let mut invocation =
            new_invocation(InterceptorChain::empty(), calculator_invoker(), vec![value(2i64), value(2i64)]);
        let mut clone = invocation.invocable_clone_with(vec![value(10i64), value(5i64)]);
        invocation.set_arguments(vec![value(1i64), value(1i64)]);

        let original = invocation.proceed().unwrap().unwrap();
        let cloned = clone.proceed().unwrap().unwrap();
        assert_eq!(original.downcast_ref::<i64>(), Some(&2));
        assert_eq!(cloned.downcast_ref::<i64>(), Some(&15));
    }

    #[test]
    fn test_clone_can_move_to_another_thread() {
        let invocation =
            new_invocation(InterceptorChain::empty(), calculator_invoker(), vec![value(4i64), value(4i64)]);
        let mut clone = invocation.invocable_clone();

        let handle = std::thread::spawn(move || clone.proceed());
        let result = handle.join().unwrap().unwrap().unwrap();
        assert_eq!(result.downcast_ref::<i64>(), Some(&8));
        assert_eq!(invocation.operation(), &ADD);
    }
}
