//! 参数名发现
//!
//! Rust 在运行时拿不到函数参数名，因此按以下顺序恢复：
//! 1. `#[advice]` 宏在编译期通过 inventory 登记的参数名
//! 2. 从切点表达式文本中出现的绑定变量推断

use crate::declaration::AdviceDeclaration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// 上下文参数在推断时使用的名称
pub const THIS_JOIN_POINT: &str = "thisJoinPoint";

/// 是否为合法的参数名
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// 基础类型名，在 `args(..)` 中按参数类型匹配
const PRIMITIVE_TYPES: &[&str] = &[
    "bool", "char", "str", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32",
    "u64", "u128", "usize", "f32", "f64",
];

/// 切点表达式中的绑定变量：小写字母或下划线开头的合法标识符，基础类型名除外
pub fn is_binding_variable(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_lowercase() || c == '_')
        && is_variable_name(token)
        && !PRIMITIVE_TYPES.contains(&token)
}

/// 参数名发现器
pub trait ParameterNameDiscoverer: Send + Sync {
    /// 返回通知方法每个参数的名称；无法确定时返回 `None`
    fn parameter_names(&self, declaration: &AdviceDeclaration) -> Option<Vec<String>>;
}

/// 编译期登记的参数名
///
/// 由 `#[advice]` 宏生成，一般无需手写
pub struct ParameterNameRegistration {
    /// 通知方法的全路径，例如 `my_app::audit::log_transfer`
    pub key: &'static str,

    /// 按声明顺序排列的参数名
    pub names: &'static [&'static str],
}

impl ParameterNameRegistration {
    pub const fn new(key: &'static str, names: &'static [&'static str]) -> Self {
        Self { key, names }
    }
}

inventory::collect!(ParameterNameRegistration);

static REGISTERED_NAMES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let names: HashMap<_, _> = inventory::iter::<ParameterNameRegistration>()
        .map(|registration| (registration.key, registration.names))
        .collect();
    tracing::debug!("Loaded parameter names for {} advice method(s)", names.len());
    names
});

/// 查找通过 inventory 登记的参数名
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisteredParameterNameDiscoverer;

impl ParameterNameDiscoverer for RegisteredParameterNameDiscoverer {
    fn parameter_names(&self, declaration: &AdviceDeclaration) -> Option<Vec<String>> {
        let names = REGISTERED_NAMES.get(declaration.method_key())?;
        if names.len() != declaration.parameter_count() {
            tracing::warn!(
                method = declaration.method_key(),
                registered = names.len(),
                declared = declaration.parameter_count(),
                "Registered parameter names do not match the declared parameters, ignoring"
            );
            return None;
        }
        Some(names.iter().map(|name| name.to_string()).collect())
    }
}

static BINDING_SITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:@annotation|@within|@target|@args|args|this|target)\(([^()]*)\)")
        .expect("binding site pattern is valid")
});

/// 从切点表达式文本推断参数名
///
/// 推断规则：
/// - 首个参数为连接点类型时命名为 `thisJoinPoint`
/// - throwing 名称绑定到唯一一个故障类型的参数
/// - returning 名称绑定到唯一剩余的参数
/// - 其余参数按顺序绑定表达式中 `args(..)`、`this(..)`、`target(..)` 等位置出现的变量
///
/// 任何一步存在歧义都放弃推断
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionParameterNameDiscoverer;

impl ExpressionParameterNameDiscoverer {
    /// 表达式中出现的绑定变量（去重，保持出现顺序）
    pub fn binding_variables(expression: &str) -> Vec<String> {
        let mut variables: Vec<String> = Vec::new();
        for site in BINDING_SITE.captures_iter(expression) {
            for token in site[1].split(',').map(str::trim) {
                if is_binding_variable(token) && !variables.iter().any(|v| v == token) {
                    variables.push(token.to_string());
                }
            }
        }
        variables
    }
}

impl ParameterNameDiscoverer for ExpressionParameterNameDiscoverer {
    fn parameter_names(&self, declaration: &AdviceDeclaration) -> Option<Vec<String>> {
        let parameter_types = declaration.parameter_types();
        let mut names: Vec<Option<String>> = vec![None; parameter_types.len()];

        if parameter_types.first().is_some_and(|t| t.is_join_point()) {
            names[0] = Some(THIS_JOIN_POINT.to_string());
        }

        if let Some(throwing) = declaration.throwing_name() {
            let mut candidates = parameter_types
                .iter()
                .enumerate()
                .filter(|(i, t)| names[*i].is_none() && t.is_fault());
            let index = candidates.next()?.0;
            if candidates.next().is_some() {
                return None;
            }
            names[index] = Some(throwing.to_string());
        }

        if let Some(returning) = declaration.returning_name() {
            let mut unbound = names.iter().enumerate().filter(|(_, n)| n.is_none());
            let index = unbound.next()?.0;
            if unbound.next().is_some() {
                return None;
            }
            names[index] = Some(returning.to_string());
        }

        let expression = declaration.pointcut().expression().unwrap_or_default();
        let mut variables = Self::binding_variables(&expression).into_iter();
        for slot in names.iter_mut().filter(|n| n.is_none()) {
            *slot = Some(variables.next()?);
        }
        if variables.next().is_some() {
            return None;
        }

        names.into_iter().collect()
    }
}

/// 依次询问多个发现器，第一个给出结果的生效
#[derive(Clone, Default)]
pub struct DiscovererChain {
    discoverers: Vec<Arc<dyn ParameterNameDiscoverer>>,
}

impl DiscovererChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discoverer(mut self, discoverer: Arc<dyn ParameterNameDiscoverer>) -> Self {
        self.discoverers.push(discoverer);
        self
    }

    pub fn len(&self) -> usize {
        self.discoverers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discoverers.is_empty()
    }
}

impl ParameterNameDiscoverer for DiscovererChain {
    fn parameter_names(&self, declaration: &AdviceDeclaration) -> Option<Vec<String>> {
        self.discoverers
            .iter()
            .find_map(|discoverer| discoverer.parameter_names(declaration))
    }
}

/// 默认发现器：先查编译期登记，再从切点表达式推断
pub fn default_discoverer() -> Arc<dyn ParameterNameDiscoverer> {
    static DEFAULT: Lazy<Arc<dyn ParameterNameDiscoverer>> = Lazy::new(|| {
        Arc::new(
            DiscovererChain::new()
                .with_discoverer(Arc::new(RegisteredParameterNameDiscoverer))
                .with_discoverer(Arc::new(ExpressionParameterNameDiscoverer)),
        )
    });
    DEFAULT.clone()
}
