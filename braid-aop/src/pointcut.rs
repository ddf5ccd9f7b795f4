//! 切点（Pointcut）
//!
//! 切点由两部分组成：
//! - [`ClassFilter`]：按目标类型过滤
//! - [`MethodMatcher`]：按操作过滤，分为静态匹配（只看签名与类型）与动态匹配（还需要运行时参数）
//!
//! [`PointcutExpression`] 提供一组可组合的匹配规则，[`ExpressionPointcut`] 对其求值。

use crate::discoverer::is_binding_variable;
use crate::operation::{Operation, Value};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 类型过滤器
pub trait ClassFilter: Send + Sync {
    fn matches(&self, target_type: &str) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配：只依据操作签名与目标类型
    fn matches(&self, operation: &Operation, target_type: &str) -> bool;

    /// 是否需要在每次调用时用运行时参数再次匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配，仅当 [`is_runtime`](Self::is_runtime) 为 true 且静态匹配通过时调用
    fn matches_runtime(&self, operation: &Operation, target_type: &str, args: &[Value]) -> bool {
        let _ = args;
        self.matches(operation, target_type)
    }

    /// 匹配结果是否依赖于目标类型上是否存在引入（introduction）
    fn is_introduction_aware(&self) -> bool {
        false
    }

    fn matches_with_introductions(
        &self,
        operation: &Operation,
        target_type: &str,
        has_introductions: bool,
    ) -> bool {
        let _ = has_introductions;
        self.matches(operation, target_type)
    }
}

/// 切点绑定的一个命名值
#[derive(Clone)]
pub struct PointcutParameter {
    name: String,
    value: Value,
}

impl PointcutParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Debug for PointcutParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointcutParameter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// 一次调用中切点绑定的全部命名值
#[derive(Debug, Clone, Default)]
pub struct JoinPointMatch {
    parameters: Vec<PointcutParameter>,
}

impl JoinPointMatch {
    pub fn new(parameters: Vec<PointcutParameter>) -> Self {
        Self { parameters }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(PointcutParameter::new(name, value));
        self
    }

    pub fn parameters(&self) -> &[PointcutParameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;

    /// 切点表达式文本，用于参数名发现
    fn expression(&self) -> Option<String> {
        None
    }

    /// 切点能够绑定的全部命名值
    ///
    /// 参数绑定时与通知声明的参数名互相核对。
    /// 覆盖 [`join_point_match`](Self::join_point_match) 的实现需同时覆盖此方法。
    fn binding_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// 计算本次调用中切点绑定的命名值
    fn join_point_match(
        &self,
        operation: &Operation,
        target_type: &str,
        args: &[Value],
    ) -> Option<JoinPointMatch> {
        let _ = (operation, target_type, args);
        None
    }
}

/// 匹配一切的切点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl ClassFilter for TruePointcut {
    fn matches(&self, _target_type: &str) -> bool {
        true
    }
}

impl MethodMatcher for TruePointcut {
    fn matches(&self, _operation: &Operation, _target_type: &str) -> bool {
        true
    }
}

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::new(TruePointcut)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::new(TruePointcut)
    }
}

type StaticPredicate = Arc<dyn Fn(&Operation, &str) -> bool + Send + Sync>;
type RuntimePredicate = Arc<dyn Fn(&Operation, &[Value]) -> bool + Send + Sync>;

/// 切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法，例如 `within(*Service)`
    Within(String),

    /// 匹配特定方法名
    MethodName(String),

    /// 匹配特定类型的特定方法，例如 `execution(* UserService.get_user(..))`
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义静态匹配函数
    Custom(StaticPredicate),

    /// 依赖运行时参数的匹配函数
    Runtime(RuntimePredicate),

    /// 参数模式，同时可绑定参数名，例如 `args(amount, ..)`
    Args(Vec<String>),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 创建 execution 表达式
    ///
    /// 格式：`返回类型 类型名.方法名(参数)`，只解析类型与方法名部分
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() < 2 {
            return PointcutExpression::All;
        }

        let method_part = parts[1];
        let method_part = method_part
            .split_once('(')
            .map_or(method_part, |(head, _)| head);
        match method_part.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
            },
            None => PointcutExpression::MethodName(method_part.to_string()),
        }
    }

    pub fn within(type_pattern: impl Into<String>) -> Self {
        PointcutExpression::Within(type_pattern.into())
    }

    pub fn method(method_pattern: impl Into<String>) -> Self {
        PointcutExpression::MethodName(method_pattern.into())
    }

    /// 参数模式：`..` 匹配任意个参数，`*` 匹配任意一个参数，
    /// 小写开头的标识符绑定该位置的参数，大写开头的标识符和 `u32`、`bool` 等基础类型名按参数类型名匹配
    pub fn args<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PointcutExpression::Args(patterns.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Operation, &str) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Custom(Arc::new(predicate))
    }

    pub fn runtime<F>(predicate: F) -> Self
    where
        F: Fn(&Operation, &[Value]) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Runtime(Arc::new(predicate))
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }

    /// 是否包含依赖运行时参数的部分
    pub fn is_runtime(&self) -> bool {
        match self {
            PointcutExpression::Runtime(_) => true,
            PointcutExpression::And(l, r) | PointcutExpression::Or(l, r) => {
                l.is_runtime() || r.is_runtime()
            }
            PointcutExpression::Not(e) => e.is_runtime(),
            _ => false,
        }
    }

    /// 类型级别的粗筛：只有 `within` 能在类型层面排除
    pub fn could_match_type(&self, target_type: &str) -> bool {
        match self {
            PointcutExpression::Within(pattern) => pattern_matches(pattern, target_type),
            PointcutExpression::TypeRegex(regex) => regex.is_match(target_type),
            PointcutExpression::And(l, r) => {
                l.could_match_type(target_type) && r.could_match_type(target_type)
            }
            PointcutExpression::Or(l, r) => {
                l.could_match_type(target_type) || r.could_match_type(target_type)
            }
            _ => true,
        }
    }

    /// 静态匹配：返回"可能匹配"，运行时部分一律视为可能匹配
    pub fn matches_static(&self, operation: &Operation, target_type: &str) -> bool {
        match self {
            PointcutExpression::All => true,
            PointcutExpression::Within(pattern) => pattern_matches(pattern, target_type),
            PointcutExpression::MethodName(pattern) => pattern_matches(pattern, operation.name()),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                (pattern_matches(type_pattern, operation.declaring_type())
                    || pattern_matches(type_pattern, target_type))
                    && pattern_matches(method_pattern, operation.name())
            }
            PointcutExpression::TypeRegex(regex) => regex.is_match(target_type),
            PointcutExpression::MethodRegex(regex) => regex.is_match(operation.name()),
            PointcutExpression::Custom(predicate) => predicate(operation, target_type),
            PointcutExpression::Runtime(_) => true,
            PointcutExpression::Args(patterns) => {
                args_match_types(patterns, operation.parameter_types())
            }
            PointcutExpression::And(l, r) => {
                l.matches_static(operation, target_type) && r.matches_static(operation, target_type)
            }
            PointcutExpression::Or(l, r) => {
                l.matches_static(operation, target_type) || r.matches_static(operation, target_type)
            }
            PointcutExpression::Not(e) => {
                e.is_runtime() || !e.matches_static(operation, target_type)
            }
        }
    }

    /// 完整匹配（含运行时参数）
    pub fn matches_runtime(&self, operation: &Operation, target_type: &str, args: &[Value]) -> bool {
        match self {
            PointcutExpression::Runtime(predicate) => predicate(operation, args),
            PointcutExpression::Args(patterns) => {
                arg_positions(patterns, args.len()).is_some()
                    && args_match_types(patterns, operation.parameter_types())
            }
            PointcutExpression::And(l, r) => {
                l.matches_runtime(operation, target_type, args)
                    && r.matches_runtime(operation, target_type, args)
            }
            PointcutExpression::Or(l, r) => {
                l.matches_runtime(operation, target_type, args)
                    || r.matches_runtime(operation, target_type, args)
            }
            PointcutExpression::Not(e) => !e.matches_runtime(operation, target_type, args),
            other => other.matches_static(operation, target_type),
        }
    }

    /// 表达式中出现的绑定变量（去重，保持出现顺序）；`!(..)` 内部不绑定
    pub fn binding_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_binding_names(&mut names);
        names
    }

    fn collect_binding_names(&self, out: &mut Vec<String>) {
        match self {
            PointcutExpression::Args(patterns) => {
                for pattern in patterns.iter().filter(|p| is_binding_variable(p)) {
                    if !out.contains(pattern) {
                        out.push(pattern.clone());
                    }
                }
            }
            PointcutExpression::And(l, r) | PointcutExpression::Or(l, r) => {
                l.collect_binding_names(out);
                r.collect_binding_names(out);
            }
            _ => {}
        }
    }

    /// 收集 `args(..)` 中绑定的命名值
    fn collect_bindings(
        &self,
        operation: &Operation,
        target_type: &str,
        args: &[Value],
        out: &mut Vec<PointcutParameter>,
    ) {
        match self {
            PointcutExpression::Args(patterns) => {
                if let Some(positions) = arg_positions(patterns, args.len()) {
                    for (pattern, index) in patterns.iter().zip(positions) {
                        if let (true, Some(index)) = (is_binding_variable(pattern), index) {
                            out.push(PointcutParameter::new(pattern.clone(), args[index].clone()));
                        }
                    }
                }
            }
            PointcutExpression::And(l, r) => {
                l.collect_bindings(operation, target_type, args, out);
                r.collect_bindings(operation, target_type, args, out);
            }
            PointcutExpression::Or(l, r) => {
                if l.matches_runtime(operation, target_type, args) {
                    l.collect_bindings(operation, target_type, args, out);
                } else {
                    r.collect_bindings(operation, target_type, args, out);
                }
            }
            _ => {}
        }
    }
}

/// 简单的模式匹配（支持 * 通配符）
///
/// - `*` 匹配任意字符串
/// - `User*` 以 User 开头
/// - `*Service` 以 Service 结尾
/// - `*Service*` 包含 Service
pub fn pattern_matches(pattern: &str, target: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == target;
    }

    let mut segments: Vec<&str> = pattern.split('*').collect();
    let last = segments.pop().unwrap_or_default();
    let mut segments = segments.into_iter();
    let first = segments.next().unwrap_or_default();

    let Some(mut rest) = target.strip_prefix(first) else {
        return false;
    };
    for segment in segments {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// 计算每个参数模式对应的参数下标；`..` 本身没有下标
fn arg_positions(patterns: &[String], arg_count: usize) -> Option<Vec<Option<usize>>> {
    match patterns.iter().position(|p| p == "..") {
        None => {
            if patterns.len() != arg_count {
                return None;
            }
            Some((0..arg_count).map(Some).collect())
        }
        Some(split) => {
            let suffix_len = patterns.len() - split - 1;
            if split + suffix_len > arg_count {
                return None;
            }
            let mut positions: Vec<Option<usize>> = (0..split).map(Some).collect();
            positions.push(None);
            positions.extend((arg_count - suffix_len..arg_count).map(Some));
            Some(positions)
        }
    }
}

fn args_match_types(patterns: &[String], parameter_types: &[&str]) -> bool {
    let Some(positions) = arg_positions(patterns, parameter_types.len()) else {
        return false;
    };
    patterns.iter().zip(positions).all(|(pattern, index)| match index {
        None => true,
        Some(_) if pattern == "*" || is_binding_variable(pattern) => true,
        Some(index) => pattern_matches(pattern, parameter_types[index]),
    })
}

impl fmt::Display for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "execution(* *.*(..))"),
            PointcutExpression::Within(p) => write!(f, "within({})", p),
            PointcutExpression::MethodName(p) => write!(f, "execution(* *.{}(..))", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => write!(f, "execution(* {}.{}(..))", type_pattern, method_pattern),
            PointcutExpression::TypeRegex(r) => write!(f, "within(/{}/)", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "execution(* *./{}/(..))", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "custom(..)"),
            PointcutExpression::Runtime(_) => write!(f, "if(..)"),
            PointcutExpression::Args(patterns) => write!(f, "args({})", patterns.join(", ")),
            PointcutExpression::And(l, r) => write!(f, "{} && {}", l, r),
            PointcutExpression::Or(l, r) => write!(f, "({} || {})", l, r),
            PointcutExpression::Not(e) => write!(f, "!({})", e),
        }
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointcutExpression({})", self)
    }
}

struct ExpressionMatcher {
    expression: PointcutExpression,
    runtime: bool,
}

impl ClassFilter for ExpressionMatcher {
    fn matches(&self, target_type: &str) -> bool {
        self.expression.could_match_type(target_type)
    }
}

impl MethodMatcher for ExpressionMatcher {
    fn matches(&self, operation: &Operation, target_type: &str) -> bool {
        self.expression.matches_static(operation, target_type)
    }

    fn is_runtime(&self) -> bool {
        self.runtime
    }

    fn matches_runtime(&self, operation: &Operation, target_type: &str, args: &[Value]) -> bool {
        self.expression.matches_runtime(operation, target_type, args)
    }
}

/// 基于 [`PointcutExpression`] 的切点
#[derive(Clone)]
pub struct ExpressionPointcut {
    matcher: Arc<ExpressionMatcher>,
}

impl ExpressionPointcut {
    pub fn new(expression: PointcutExpression) -> Self {
        let runtime = expression.is_runtime();
        Self {
            matcher: Arc::new(ExpressionMatcher {
                expression,
                runtime,
            }),
        }
    }

    pub fn expression_ref(&self) -> &PointcutExpression {
        &self.matcher.expression
    }
}

impl From<PointcutExpression> for ExpressionPointcut {
    fn from(expression: PointcutExpression) -> Self {
        Self::new(expression)
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpressionPointcut")
            .field(&self.matcher.expression)
            .finish()
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        self.matcher.clone()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }

    fn expression(&self) -> Option<String> {
        Some(self.matcher.expression.to_string())
    }

    fn binding_names(&self) -> Vec<String> {
        self.matcher.expression.binding_names()
    }

    fn join_point_match(
        &self,
        operation: &Operation,
        target_type: &str,
        args: &[Value],
    ) -> Option<JoinPointMatch> {
        let mut parameters = Vec::new();
        self.matcher
            .expression
            .collect_bindings(operation, target_type, args, &mut parameters);
        if parameters.is_empty() {
            None
        } else {
            Some(JoinPointMatch::new(parameters))
        }
    }
}
