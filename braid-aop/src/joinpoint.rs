//! 连接点（JoinPoint）定义
//!
//! 连接点是对一次进行中调用的只读视图，供声明式通知读取签名、参数与目标。
//! 环绕通知使用 [`ProceedingJoinPoint`] 继续执行调用链。

use crate::invocation::MethodInvocation;
use crate::operation::{value, InvocationResult, Operation, Value};
use std::fmt;
use std::sync::Arc;

const STATIC_PART_KEY: &str = "braid_aop::joinpoint::StaticPart";

/// 连接点种类
pub const METHOD_EXECUTION: &str = "method-execution";

/// 连接点中与具体调用无关的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPart {
    operation: Operation,
    target_type: &'static str,
}

impl StaticPart {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    pub fn kind(&self) -> &'static str {
        METHOD_EXECUTION
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        self.operation.signature()
    }
}

impl fmt::Display for StaticPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution({})", self.operation)
    }
}

/// 连接点信息
#[derive(Clone, Copy)]
pub struct JoinPoint<'a> {
    invocation: &'a MethodInvocation,
}

impl<'a> JoinPoint<'a> {
    pub fn new(invocation: &'a MethodInvocation) -> Self {
        Self { invocation }
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        self.invocation.operation().signature()
    }

    pub fn operation(&self) -> &'a Operation {
        self.invocation.operation()
    }

    pub fn args(&self) -> &'a [Value] {
        self.invocation.arguments()
    }

    /// 尝试按类型获取参数
    pub fn arg<T: 'static>(&self, index: usize) -> Option<&'a T> {
        self.args().get(index)?.downcast_ref::<T>()
    }

    /// 目标对象
    pub fn target(&self) -> Option<&'a Value> {
        self.invocation.target()
    }

    /// 代理对象
    pub fn this(&self) -> &'a Value {
        self.invocation.proxy()
    }

    pub fn target_type(&self) -> &'static str {
        self.invocation.target_type()
    }

    pub fn kind(&self) -> &'static str {
        METHOD_EXECUTION
    }

    /// 静态部分，在一次调用内只创建一次
    pub fn static_part(&self) -> Arc<StaticPart> {
        let invocation = self.invocation;
        let cached = invocation.attribute_or_insert_with(STATIC_PART_KEY, || {
            value(StaticPart {
                operation: *invocation.operation(),
                target_type: invocation.target_type(),
            })
        });
        cached.downcast::<StaticPart>().unwrap_or_else(|_| {
            Arc::new(StaticPart {
                operation: *invocation.operation(),
                target_type: invocation.target_type(),
            })
        })
    }

    pub fn invocation(&self) -> &'a MethodInvocation {
        self.invocation
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("target_type", &self.target_type())
            .field("signature", &self.signature())
            .field("args", &self.args().len())
            .finish()
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution({})", self.operation())
    }
}

/// 环绕通知的执行链
///
/// 每次 [`proceed`](Self::proceed) 都从当前位置克隆出新的调用继续执行，
/// 因此可以多次调用。
pub struct ProceedingJoinPoint<'a> {
    invocation: &'a mut MethodInvocation,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub fn new(invocation: &'a mut MethodInvocation) -> Self {
        Self { invocation }
    }

    /// 继续执行调用链
    pub fn proceed(&mut self) -> InvocationResult {
        self.invocation.invocable_clone().proceed()
    }

    /// 以新的参数继续执行调用链
    pub fn proceed_with(&mut self, args: Vec<Value>) -> InvocationResult {
        self.invocation.set_arguments(args.clone());
        self.invocation.invocable_clone_with(args).proceed()
    }

    /// 获取连接点信息
    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint::new(self.invocation)
    }

    pub fn signature(&self) -> String {
        self.invocation.operation().signature()
    }

    pub fn args(&self) -> &[Value] {
        self.invocation.arguments()
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point())
            .finish()
    }
}
