//! 操作描述与真实操作调用
//!
//! Rust 没有运行时反射，目标方法通过 [`TargetInvoker`] 按操作名分派。
//! [`MethodTable`] 是最常用的实现：为某个具体类型登记一组闭包。

use crate::error::InvocationError;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 动态值：参数、返回值、目标对象与代理对象的统一表示
pub type Value = Arc<dyn Any + Send + Sync>;

/// 一次调用的结果，`Ok(None)` 表示无返回值（或空值）
pub type InvocationResult = Result<Option<Value>, InvocationError>;

/// 将任意值装箱为 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 判断两个值是否为同一个实例
pub fn same_instance(a: &Value, b: &Value) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 按下标读取类型化参数
pub fn argument<T: Any>(args: &[Value], index: usize) -> Result<&T, InvocationError> {
    args.get(index)
        .and_then(|arg| arg.downcast_ref::<T>())
        .ok_or(InvocationError::ArgumentMismatch {
            index,
            expected: type_name::<T>(),
        })
}

/// 声明的返回类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// 无返回值
    Unit,
    /// 非空基础类型，空返回值是致命错误
    Primitive(&'static str),
    /// 可空对象
    Object(&'static str),
    /// 与代理兼容的类型：返回目标自身时替换为代理
    Proxyable(&'static str),
    /// 显式要求访问原始目标，不做代理替换
    RawTargetAccess(&'static str),
}

impl ReturnType {
    pub fn name(&self) -> &'static str {
        match self {
            ReturnType::Unit => "()",
            ReturnType::Primitive(name)
            | ReturnType::Object(name)
            | ReturnType::Proxyable(name)
            | ReturnType::RawTargetAccess(name) => name,
        }
    }
}

/// 操作描述符
///
/// 全部由 `'static` 数据构成，可作为常量声明并作为缓存键使用：
///
/// ```
/// use braid_aop::{Operation, ReturnType};
///
/// const TRANSFER: Operation = Operation::new("AccountService", "transfer")
///     .with_parameters(&["String", "u64"])
///     .returning(ReturnType::Primitive("bool"));
///
/// assert_eq!(TRANSFER.signature(), "AccountService::transfer");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    declaring_type: &'static str,
    name: &'static str,
    parameter_types: &'static [&'static str],
    return_type: ReturnType,
}

impl Operation {
    pub const fn new(declaring_type: &'static str, name: &'static str) -> Self {
        Self {
            declaring_type,
            name,
            parameter_types: &[],
            return_type: ReturnType::Unit,
        }
    }

    pub const fn with_parameters(mut self, parameter_types: &'static [&'static str]) -> Self {
        self.parameter_types = parameter_types;
        self
    }

    pub const fn returning(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parameter_types(&self) -> &'static [&'static str] {
        self.parameter_types
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// 完整签名，例如 `AccountService::transfer`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}({})",
            self.return_type.name(),
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// 真实操作调用器
///
/// 相当于其他语言中的反射调用：在目标对象上执行指定操作
pub trait TargetInvoker: Send + Sync {
    fn invoke(
        &self,
        target: Option<&Value>,
        operation: &Operation,
        args: &[Value],
    ) -> InvocationResult;
}

type MethodFn<T> = Arc<dyn Fn(&Arc<T>, &[Value]) -> InvocationResult + Send + Sync>;

/// 基于类型的操作表
///
/// ```
/// use braid_aop::{argument, value, MethodTable};
///
/// struct Calculator;
///
/// let table = MethodTable::<Calculator>::new()
///     .operation("add", |_calc, args| {
///         let a = argument::<i64>(args, 0)?;
///         let b = argument::<i64>(args, 1)?;
///         Ok(Some(value(a + b)))
///     });
/// assert!(table.supports("add"));
/// ```
pub struct MethodTable<T> {
    methods: HashMap<&'static str, MethodFn<T>>,
}

impl<T: Any + Send + Sync> MethodTable<T> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// 登记一个操作
    pub fn operation<F>(mut self, name: &'static str, method: F) -> Self
    where
        F: Fn(&Arc<T>, &[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        self.methods.insert(name, Arc::new(method));
        self
    }

    pub fn supports(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

impl<T: Any + Send + Sync> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Send + Sync> TargetInvoker for MethodTable<T> {
    fn invoke(
        &self,
        target: Option<&Value>,
        operation: &Operation,
        args: &[Value],
    ) -> InvocationResult {
        let method = self
            .methods
            .get(operation.name())
            .ok_or_else(|| InvocationError::NoSuchOperation {
                target_type: type_name::<T>().to_string(),
                operation: operation.name().to_string(),
            })?;

        let target = target.cloned().ok_or_else(|| {
            InvocationError::Internal(format!(
                "no target instance available to invoke {}",
                operation.signature()
            ))
        })?;
        let target = target.downcast::<T>().map_err(|_| {
            InvocationError::Internal(format!(
                "target of {} is not an instance of {}",
                operation.signature(),
                type_name::<T>()
            ))
        })?;

        method(&target, args)
    }
}
