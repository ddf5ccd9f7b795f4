//! 通知参数绑定
//!
//! 每个通知声明在首次使用时计算一次 [`ArgumentBinding`]：
//! 通知方法的每个参数从哪里取值（连接点、切点绑定的命名值、返回值或故障）。
//! 计算结果不可变，之后每次调用只做 [`ArgumentBinding::resolve`]。

use crate::declaration::AdviceDeclaration;
use crate::discoverer::{is_variable_name, ParameterNameDiscoverer, THIS_JOIN_POINT};
use crate::error::{AopConfigError, Fault, InvocationError};
use crate::operation::Value;
use crate::pointcut::JoinPointMatch;
use std::any::Any;
use std::fmt;

/// 参数来源
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    /// 隐式的连接点参数，只能位于第一个
    JoinPoint,
    /// 切点绑定的命名值
    Pointcut(String),
    /// 返回值
    Returning(String),
    /// 抛出的故障
    Throwing(String),
}

/// 通知方法的实参
#[derive(Clone)]
pub enum AdviceArgument {
    /// 连接点占位：由通知方法直接接收的 `JoinPoint` / `ProceedingJoinPoint`
    JoinPoint,
    Value(Value),
    Fault(Fault),
    /// 空值（例如无返回值的方法）
    Null,
}

impl AdviceArgument {
    pub fn is_join_point(&self) -> bool {
        matches!(self, AdviceArgument::JoinPoint)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AdviceArgument::Null)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            AdviceArgument::Value(value) => Some(value),
            _ => None,
        }
    }

    /// 按类型读取值
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value()?.downcast_ref::<T>()
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            AdviceArgument::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl fmt::Debug for AdviceArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceArgument::JoinPoint => write!(f, "JoinPoint"),
            AdviceArgument::Value(_) => write!(f, "Value(..)"),
            AdviceArgument::Fault(fault) => write!(f, "Fault({})", fault),
            AdviceArgument::Null => write!(f, "Null"),
        }
    }
}

/// 一次调用的结果，决定返回值/故障槽位的取值
#[derive(Clone, Copy)]
pub enum Outcome<'a> {
    None,
    Returned(Option<&'a Value>),
    Threw(&'a Fault),
}

/// 参数绑定表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    slots: Vec<BindingSlot>,
    pointcut_parameters: Vec<(String, usize)>,
    returning_index: Option<usize>,
    throwing_index: Option<usize>,
}

impl ArgumentBinding {
    pub fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    /// 交给切点在匹配时绑定的参数名
    pub fn pointcut_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.pointcut_parameters.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_pointcut_parameters(&self) -> bool {
        !self.pointcut_parameters.is_empty()
    }

    pub fn returning_index(&self) -> Option<usize> {
        self.returning_index
    }

    pub fn throwing_index(&self) -> Option<usize> {
        self.throwing_index
    }

    pub fn has_join_point_slot(&self) -> bool {
        self.slots.first() == Some(&BindingSlot::JoinPoint)
    }

    /// 计算本次调用的实参
    ///
    /// 填充的个数必须与声明的参数个数完全一致，否则说明绑定与匹配失去同步，
    /// 返回 [`InvocationError::BindingMismatch`] 终止调用。
    pub fn resolve(
        &self,
        join_point_match: Option<&JoinPointMatch>,
        outcome: Outcome<'_>,
    ) -> Result<Vec<AdviceArgument>, InvocationError> {
        let mut arguments = vec![AdviceArgument::Null; self.slots.len()];
        let mut bound = 0;

        if self.has_join_point_slot() {
            arguments[0] = AdviceArgument::JoinPoint;
            bound += 1;
        }

        if let Some(join_point_match) = join_point_match {
            for parameter in join_point_match.parameters() {
                let index = self
                    .pointcut_parameters
                    .iter()
                    .find(|(name, _)| name == parameter.name())
                    .map(|(_, index)| *index)
                    .ok_or_else(|| {
                        InvocationError::Internal(format!(
                            "pointcut bound '{}' which is not a parameter of the advice",
                            parameter.name()
                        ))
                    })?;
                arguments[index] = AdviceArgument::Value(parameter.value().clone());
                bound += 1;
            }
        }

        match outcome {
            Outcome::Returned(return_value) => {
                if let Some(index) = self.returning_index {
                    arguments[index] = return_value
                        .map_or(AdviceArgument::Null, |v| AdviceArgument::Value(v.clone()));
                    bound += 1;
                }
            }
            Outcome::Threw(fault) => {
                if let Some(index) = self.throwing_index {
                    arguments[index] = AdviceArgument::Fault(fault.clone());
                    bound += 1;
                }
            }
            Outcome::None => {}
        }

        if bound != self.slots.len() {
            return Err(InvocationError::BindingMismatch {
                required: self.slots.len(),
                bound,
                join_point_match_bound: join_point_match.is_some(),
            });
        }
        Ok(arguments)
    }
}

/// 计算通知声明的参数绑定
///
/// 纯函数：对同一个声明多次调用得到相同的结果
pub fn bind_arguments(
    declaration: &AdviceDeclaration,
    discoverer: &dyn ParameterNameDiscoverer,
) -> Result<ArgumentBinding, AopConfigError> {
    let method = declaration.method_key();
    let parameter_types = declaration.parameter_types();
    let count = parameter_types.len();

    if let Some(index) = parameter_types
        .iter()
        .skip(1)
        .position(|t| t.is_join_point())
    {
        return Err(AopConfigError::JoinPointNotFirst {
            method: method.to_string(),
            index: index + 1,
        });
    }
    let has_context = parameter_types.first().is_some_and(|t| t.is_join_point());

    let names = resolve_names(declaration, discoverer, has_context)?;
    if names.len() != count {
        return Err(AopConfigError::ParameterNameCountMismatch {
            method: method.to_string(),
            expected: count,
            actual: names.len(),
        });
    }
    for (i, name) in names.iter().enumerate() {
        if !is_variable_name(name) {
            return Err(AopConfigError::IllegalParameterName {
                method: method.to_string(),
                name: name.clone(),
            });
        }
        if names[..i].contains(name) {
            return Err(AopConfigError::DuplicateParameterName {
                method: method.to_string(),
                name: name.clone(),
            });
        }
    }

    let first_bindable = usize::from(has_context);
    let find = |kind: &'static str, name: Option<&str>| -> Result<Option<usize>, AopConfigError> {
        let Some(name) = name else {
            return Ok(None);
        };
        names
            .iter()
            .skip(first_bindable)
            .position(|n| n == name)
            .map(|i| Some(i + first_bindable))
            .ok_or_else(|| AopConfigError::BindingNameNotFound {
                method: method.to_string(),
                kind,
                name: name.to_string(),
            })
    };
    let returning_index = find("Returning", declaration.returning_name())?;
    let throwing_index = find("Throwing", declaration.throwing_name())?;

    let mut slots = Vec::with_capacity(count);
    let mut pointcut_parameters = Vec::new();
    for (index, name) in names.into_iter().enumerate() {
        let slot = if index == 0 && has_context {
            BindingSlot::JoinPoint
        } else if Some(index) == returning_index {
            BindingSlot::Returning(name)
        } else if Some(index) == throwing_index {
            BindingSlot::Throwing(name)
        } else {
            pointcut_parameters.push((name.clone(), index));
            BindingSlot::Pointcut(name)
        };
        slots.push(slot);
    }

    let bindable = declaration.pointcut().binding_names();
    if let Some((name, _)) = pointcut_parameters
        .iter()
        .find(|(name, _)| !bindable.contains(name))
    {
        return Err(AopConfigError::PointcutCannotBind {
            method: method.to_string(),
            name: name.clone(),
        });
    }
    if let Some(name) = bindable
        .iter()
        .find(|name| !pointcut_parameters.iter().any(|(parameter, _)| parameter == *name))
    {
        return Err(AopConfigError::UnboundPointcutVariable {
            method: method.to_string(),
            name: name.clone(),
        });
    }

    tracing::debug!(
        method,
        parameters = count,
        pointcut_parameters = pointcut_parameters.len(),
        "Computed advice argument binding"
    );

    Ok(ArgumentBinding {
        slots,
        pointcut_parameters,
        returning_index,
        throwing_index,
    })
}

fn resolve_names(
    declaration: &AdviceDeclaration,
    discoverer: &dyn ParameterNameDiscoverer,
    has_context: bool,
) -> Result<Vec<String>, AopConfigError> {
    let count = declaration.parameter_count();
    let method = declaration.method_key();

    if let Some(explicit) = declaration.argument_names() {
        if let Some(illegal) = explicit.iter().find(|name| !is_variable_name(name)) {
            return Err(AopConfigError::IllegalParameterName {
                method: method.to_string(),
                name: illegal.clone(),
            });
        }
        if explicit.len() + 1 == count && has_context {
            let mut names = Vec::with_capacity(count);
            names.push(THIS_JOIN_POINT.to_string());
            names.extend(explicit.iter().cloned());
            return Ok(names);
        }
        return Ok(explicit.to_vec());
    }

    let unbound = count - usize::from(has_context);
    if unbound == 0 {
        return Ok(if has_context {
            vec![THIS_JOIN_POINT.to_string()]
        } else {
            Vec::new()
        });
    }

    discoverer
        .parameter_names(declaration)
        .ok_or_else(|| AopConfigError::UnresolvedParameterNames {
            method: method.to_string(),
            unbound,
        })
}
