//! 常用拦截器

use crate::advice::MethodInterceptor;
use crate::error::{Fault, InvocationError};
use crate::invocation::MethodInvocation;
use crate::operation::InvocationResult;
use std::error::Error;
use std::time::{Duration, Instant};

/// 结构化的故障信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInfo {
    /// 故障消息
    pub message: String,

    /// 故障类型名称
    pub fault_type: String,

    /// 故障源链（cause chain）
    pub source_chain: Vec<String>,
}

impl FaultInfo {
    pub fn from_error<E: Error>(error: &E) -> Self {
        Self::describe(error, std::any::type_name::<E>())
    }

    /// 从故障对象创建；具体类型在擦除后不可知
    pub fn from_fault(fault: &Fault) -> Self {
        Self::describe(fault.as_ref(), "dyn Error")
    }

    /// 调用错误：抛出的故障按故障描述，框架错误按错误本身描述
    pub fn from_invocation_error(error: &InvocationError) -> Self {
        match error.fault() {
            Some(fault) => Self::from_fault(fault),
            None => Self::from_error(error),
        }
    }

    fn describe(error: &(dyn Error + '_), fault_type: &str) -> Self {
        let mut source_chain = Vec::new();
        let mut current_source = error.source();
        while let Some(source) = current_source {
            source_chain.push(source.to_string());
            current_source = source.source();
        }

        Self {
            message: error.to_string(),
            fault_type: fault_type.to_string(),
            source_chain,
        }
    }

    /// 完整描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

/// 记录进入、退出与故障的拦截器
#[derive(Debug, Clone, Default)]
pub struct TracingInterceptor {
    log_args: bool,
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数个数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for TracingInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let signature = invocation.operation().signature();
        if self.log_args {
            tracing::info!("→ Entering: {} ({} argument(s))", signature, invocation.arguments().len());
        } else {
            tracing::info!("→ Entering: {}", signature);
        }

        let started = Instant::now();
        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", signature, started.elapsed()),
            Err(error) => tracing::error!(
                "✗ Fault in {}: {}",
                signature,
                FaultInfo::from_invocation_error(error).full_description()
            ),
        }
        result
    }

    fn name(&self) -> &str {
        "TracingInterceptor"
    }
}

/// 性能监控拦截器，超过阈值时记录警告
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.threshold
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let started = Instant::now();
        let result = invocation.proceed();
        let elapsed = started.elapsed();

        if self.is_slow(elapsed) {
            tracing::warn!(
                "Slow operation detected: {} took {}ms (threshold: {}ms)",
                invocation.operation().signature(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::debug!(
                operation = %invocation.operation().signature(),
                elapsed_us = elapsed.as_micros() as u64,
                "operation timed"
            );
        }
        result
    }

    fn name(&self) -> &str {
        "PerformanceMonitorInterceptor"
    }
}
