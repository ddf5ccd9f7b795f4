//! 测试夹具

use crate::advice::{AfterAdvice, BeforeAdvice, MethodInterceptor};
use crate::chain::InterceptorChain;
use crate::error::InvocationError;
use crate::invocation::MethodInvocation;
use crate::operation::{
    argument, value, InvocationResult, MethodTable, Operation, ReturnType, TargetInvoker, Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const CALCULATOR: &str = "Calculator";

pub const ADD: Operation = Operation::new(CALCULATOR, "add")
    .with_parameters(&["i64", "i64"])
    .returning(ReturnType::Primitive("i64"));

pub const DIVIDE: Operation = Operation::new(CALCULATOR, "divide")
    .with_parameters(&["i64", "i64"])
    .returning(ReturnType::Primitive("i64"));

/// 返回自身
pub const ITSELF: Operation =
    Operation::new(CALCULATOR, "itself").returning(ReturnType::Proxyable(CALCULATOR));

/// 返回自身，但要求访问原始目标
pub const RAW_SELF: Operation =
    Operation::new(CALCULATOR, "raw_self").returning(ReturnType::RawTargetAccess(CALCULATOR));

/// 声明返回基础类型却返回空值
pub const BROKEN: Operation =
    Operation::new(CALCULATOR, "broken").returning(ReturnType::Primitive("i64"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("division by zero")]
pub struct ArithmeticFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient funds")]
pub struct InsufficientFunds;

#[derive(Debug, Default)]
pub struct Calculator;

pub fn calculator_table() -> MethodTable<Calculator> {
    MethodTable::<Calculator>::new()
        .operation("add", |_, args| {
            Ok(Some(value(argument::<i64>(args, 0)? + argument::<i64>(args, 1)?)))
        })
        .operation("divide", |_, args| {
            let divisor = *argument::<i64>(args, 1)?;
            if divisor == 0 {
                return Err(InvocationError::thrown(ArithmeticFault));
            }
            Ok(Some(value(argument::<i64>(args, 0)? / divisor)))
        })
        .operation("itself", |calculator, _| {
            let itself: Value = calculator.clone();
            Ok(Some(itself))
        })
        .operation("raw_self", |calculator, _| {
            let itself: Value = calculator.clone();
            Ok(Some(itself))
        })
        .operation("broken", |_, _| Ok(None))
}

pub fn calculator_invoker() -> Arc<dyn TargetInvoker> {
    Arc::new(calculator_table())
}

pub fn new_invocation(
    chain: InterceptorChain,
    invoker: Arc<dyn TargetInvoker>,
    args: Vec<Value>,
) -> MethodInvocation {
    MethodInvocation::new(
        value(()),
        Some(value(Calculator)),
        ADD,
        args,
        CALCULATOR,
        chain,
        invoker,
    )
}

pub fn divide_invocation(chain: InterceptorChain, args: Vec<Value>) -> MethodInvocation {
    MethodInvocation::new(
        value(()),
        Some(value(Calculator)),
        DIVIDE,
        args,
        CALCULATOR,
        chain,
        calculator_invoker(),
    )
}

/// 统计真实操作被调用的次数
pub struct CountingInvoker {
    inner: Arc<dyn TargetInvoker>,
    count: AtomicUsize,
}

impl CountingInvoker {
    pub fn new(inner: Arc<dyn TargetInvoker>) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl TargetInvoker for CountingInvoker {
    fn invoke(&self, target: Option<&Value>, operation: &Operation, args: &[Value]) -> InvocationResult {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke(target, operation, args)
    }
}

/// 按顺序记录事件
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn record(&self, event: &str) {
        self.events.lock().push(event.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// 记录进入、退出与故障的拦截器
pub struct RecordingInterceptor {
    name: &'static str,
    recorder: Recorder,
}

impl RecordingInterceptor {
    pub fn new(name: &'static str, recorder: &Recorder) -> Self {
        Self {
            name,
            recorder: recorder.clone(),
        }
    }
}

impl MethodInterceptor for RecordingInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        self.recorder.record(&format!("{}:enter", self.name));
        let result = invocation.proceed();
        let event = if result.is_ok() { "exit" } else { "fault" };
        self.recorder.record(&format!("{}:{}", self.name, event));
        result
    }

    fn name(&self) -> &str {
        self.name
    }
}

pub struct NoopInterceptor;

impl MethodInterceptor for NoopInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        invocation.proceed()
    }
}

pub struct NoopBefore;

impl BeforeAdvice for NoopBefore {
    fn before(&self, _invocation: &MethodInvocation) -> Result<(), InvocationError> {
        Ok(())
    }
}

pub struct NoopAfter;

impl AfterAdvice for NoopAfter {
    fn after(&self, _invocation: &MethodInvocation) -> Result<(), InvocationError> {
        Ok(())
    }
}
