//! 通知声明
//!
//! 切面中的一个通知方法：通知类型、形参类型、参数名、切点以及方法本体。
//! 声明实现全部五种通知 trait，调用时先按 [`ArgumentBinding`] 计算实参再调用方法本体。

use crate::advice::{
    AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice, AdviceType,
    BeforeAdvice,
};
use crate::binding::{bind_arguments, AdviceArgument, ArgumentBinding, Outcome};
use crate::discoverer::{default_discoverer, ParameterNameDiscoverer};
use crate::error::{AopConfigError, Fault, InvocationError};
use crate::invocation::MethodInvocation;
use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
use crate::operation::{InvocationResult, Value};
use crate::pointcut::{JoinPointMatch, Pointcut, TruePointcut};
use once_cell::sync::OnceCell;
use std::any::{type_name, Any};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

type ValueCheck = fn(&(dyn Any + Send + Sync)) -> bool;
type FaultCheck = fn(&(dyn Error + Send + Sync + 'static)) -> bool;

/// 形参类别
#[derive(Clone, Copy)]
pub enum ParameterKind {
    JoinPoint,
    ProceedingJoinPoint,
    StaticPart,
    /// 任意值
    Object,
    Value(ValueCheck),
    Fault(FaultCheck),
}

/// 通知方法的形参类型
#[derive(Clone, Copy)]
pub struct ParameterType {
    name: &'static str,
    kind: ParameterKind,
}

fn is_value<T: Any>(value: &(dyn Any + Send + Sync)) -> bool {
    value.is::<T>()
}

fn is_fault<E: Error + 'static>(fault: &(dyn Error + Send + Sync + 'static)) -> bool {
    fault.is::<E>()
}

fn any_fault(_: &(dyn Error + Send + Sync + 'static)) -> bool {
    true
}

impl ParameterType {
    pub fn join_point() -> Self {
        Self {
            name: "JoinPoint",
            kind: ParameterKind::JoinPoint,
        }
    }

    pub fn proceeding_join_point() -> Self {
        Self {
            name: "ProceedingJoinPoint",
            kind: ParameterKind::ProceedingJoinPoint,
        }
    }

    pub fn static_part() -> Self {
        Self {
            name: "StaticPart",
            kind: ParameterKind::StaticPart,
        }
    }

    pub fn object() -> Self {
        Self {
            name: "Object",
            kind: ParameterKind::Object,
        }
    }

    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            name: type_name::<T>(),
            kind: ParameterKind::Value(is_value::<T>),
        }
    }

    pub fn fault<E: Error + Send + Sync + 'static>() -> Self {
        Self {
            name: type_name::<E>(),
            kind: ParameterKind::Fault(is_fault::<E>),
        }
    }

    pub fn any_fault() -> Self {
        Self {
            name: "Fault",
            kind: ParameterKind::Fault(any_fault),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// 连接点类参数（只能作为第一个参数）
    pub fn is_join_point(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::JoinPoint | ParameterKind::ProceedingJoinPoint | ParameterKind::StaticPart
        )
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.kind, ParameterKind::Fault(_))
    }

    /// 返回值能否赋给该参数；空值只匹配 `object()`
    pub fn accepts_value(&self, value: Option<&Value>) -> bool {
        match (self.kind, value) {
            (ParameterKind::Object, _) => true,
            (ParameterKind::Value(check), Some(value)) => check(&**value),
            _ => false,
        }
    }

    pub fn accepts_fault(&self, fault: &Fault) -> bool {
        match self.kind {
            ParameterKind::Fault(check) => check(&**fault),
            ParameterKind::Object => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

type PlainMethod = Arc<dyn Fn(&JoinPoint<'_>, &[AdviceArgument]) -> InvocationResult + Send + Sync>;
type ProceedingMethod =
    Arc<dyn Fn(&mut ProceedingJoinPoint<'_>, &[AdviceArgument]) -> InvocationResult + Send + Sync>;

/// 通知方法本体
#[derive(Clone)]
pub enum AdviceMethod {
    Plain(PlainMethod),
    /// 环绕通知，可以继续执行调用链
    Proceeding(ProceedingMethod),
}

/// 通知声明
pub struct AdviceDeclaration {
    aspect_name: String,
    method_key: String,
    advice_type: AdviceType,
    parameter_types: Vec<ParameterType>,
    argument_names: Option<Vec<String>>,
    returning_name: Option<String>,
    throwing_name: Option<String>,
    pointcut: Arc<dyn Pointcut>,
    declaration_order: u32,
    discoverer: Arc<dyn ParameterNameDiscoverer>,
    method: AdviceMethod,
    binding: OnceCell<Result<ArgumentBinding, AopConfigError>>,
}

impl AdviceDeclaration {
    /// `method_key` 通常使用 [`advice_key!`](crate::advice_key) 生成，以便查找编译期登记的参数名
    pub fn builder(
        aspect_name: impl Into<String>,
        method_key: impl Into<String>,
        advice_type: AdviceType,
    ) -> AdviceDeclarationBuilder {
        AdviceDeclarationBuilder {
            aspect_name: aspect_name.into(),
            method_key: method_key.into(),
            advice_type,
            parameter_types: Vec::new(),
            argument_names: None,
            returning_name: None,
            throwing_name: None,
            pointcut: None,
            declaration_order: 0,
            discoverer: None,
            method: None,
        }
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    pub fn method_key(&self) -> &str {
        &self.method_key
    }

    pub fn advice_type(&self) -> AdviceType {
        self.advice_type
    }

    pub fn parameter_types(&self) -> &[ParameterType] {
        &self.parameter_types
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    pub fn argument_names(&self) -> Option<&[String]> {
        self.argument_names.as_deref()
    }

    pub fn returning_name(&self) -> Option<&str> {
        self.returning_name.as_deref()
    }

    pub fn throwing_name(&self) -> Option<&str> {
        self.throwing_name.as_deref()
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    pub fn declaration_order(&self) -> u32 {
        self.declaration_order
    }

    /// 参数绑定，首次调用时计算，失败结果同样被缓存
    pub fn argument_binding(&self) -> Result<&ArgumentBinding, AopConfigError> {
        self.binding
            .get_or_init(|| bind_arguments(self, self.discoverer.as_ref()))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// 绑定得到的返回值类型；未声明 returning 时为空
    pub fn returning_type(&self) -> Option<ParameterType> {
        let index = self.argument_binding().ok()?.returning_index()?;
        self.parameter_types.get(index).copied()
    }

    pub fn throwing_type(&self) -> Option<ParameterType> {
        let index = self.argument_binding().ok()?.throwing_index()?;
        self.parameter_types.get(index).copied()
    }

    fn join_point_match(
        &self,
        binding: &ArgumentBinding,
        invocation: &MethodInvocation,
    ) -> Option<JoinPointMatch> {
        if !binding.has_pointcut_parameters() {
            return None;
        }
        self.pointcut.join_point_match(
            invocation.operation(),
            invocation.target_type(),
            invocation.arguments(),
        )
    }

    fn invoke_plain(&self, invocation: &MethodInvocation, outcome: Outcome<'_>) -> InvocationResult {
        let binding = self.argument_binding()?;
        let join_point_match = self.join_point_match(binding, invocation);
        let arguments = binding.resolve(join_point_match.as_ref(), outcome)?;

        match &self.method {
            AdviceMethod::Plain(method) => method(&JoinPoint::new(invocation), &arguments),
            AdviceMethod::Proceeding(_) => Err(InvocationError::Internal(format!(
                "advice '{}' requires a proceeding join point",
                self.method_key
            ))),
        }
    }
}

impl fmt::Debug for AdviceDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceDeclaration")
            .field("aspect", &self.aspect_name)
            .field("method", &self.method_key)
            .field("type", &self.advice_type)
            .field("parameters", &self.parameter_types)
            .field("pointcut", &self.pointcut.expression())
            .field("order", &self.declaration_order)
            .finish()
    }
}

impl BeforeAdvice for AdviceDeclaration {
    fn before(&self, invocation: &MethodInvocation) -> Result<(), InvocationError> {
        self.invoke_plain(invocation, Outcome::None).map(|_| ())
    }
}

impl AfterAdvice for AdviceDeclaration {
    fn after(&self, invocation: &MethodInvocation) -> Result<(), InvocationError> {
        self.invoke_plain(invocation, Outcome::None).map(|_| ())
    }
}

impl AfterReturningAdvice for AdviceDeclaration {
    fn after_returning(
        &self,
        return_value: Option<&Value>,
        invocation: &MethodInvocation,
    ) -> Result<(), InvocationError> {
        let applies = self
            .returning_type()
            .map_or(true, |returning| returning.accepts_value(return_value));
        if !applies {
            return Ok(());
        }
        self.invoke_plain(invocation, Outcome::Returned(return_value))
            .map(|_| ())
    }
}

impl AfterThrowingAdvice for AdviceDeclaration {
    fn after_throwing(&self, fault: &Fault, invocation: &MethodInvocation) -> Result<(), InvocationError> {
        let applies = self
            .throwing_type()
            .map_or(true, |throwing| throwing.accepts_fault(fault));
        if !applies {
            return Ok(());
        }
        self.invoke_plain(invocation, Outcome::Threw(fault)).map(|_| ())
    }
}

impl AroundAdvice for AdviceDeclaration {
    fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let AdviceMethod::Proceeding(method) = &self.method else {
            return self.invoke_plain(invocation, Outcome::None);
        };
        let binding = self.argument_binding()?;
        let join_point_match = self.join_point_match(binding, invocation);
        let arguments = binding.resolve(join_point_match.as_ref(), Outcome::None)?;

        let mut join_point = ProceedingJoinPoint::new(invocation);
        method(&mut join_point, &arguments)
    }
}

/// 通知声明构建器
pub struct AdviceDeclarationBuilder {
    aspect_name: String,
    method_key: String,
    advice_type: AdviceType,
    parameter_types: Vec<ParameterType>,
    argument_names: Option<Vec<String>>,
    returning_name: Option<String>,
    throwing_name: Option<String>,
    pointcut: Option<Arc<dyn Pointcut>>,
    declaration_order: u32,
    discoverer: Option<Arc<dyn ParameterNameDiscoverer>>,
    method: Option<AdviceMethod>,
}

impl AdviceDeclarationBuilder {
    pub fn parameters(mut self, parameter_types: Vec<ParameterType>) -> Self {
        self.parameter_types = parameter_types;
        self
    }

    pub fn parameter(mut self, parameter_type: ParameterType) -> Self {
        self.parameter_types.push(parameter_type);
        self
    }

    /// 显式给出参数名
    pub fn argument_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// 以逗号分隔的参数名，例如 `"from, to"`
    pub fn arg_names(self, names: &str) -> Self {
        self.argument_names(
            names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        )
    }

    pub fn returning(mut self, name: impl Into<String>) -> Self {
        self.returning_name = Some(name.into());
        self
    }

    pub fn throwing(mut self, name: impl Into<String>) -> Self {
        self.throwing_name = Some(name.into());
        self
    }

    pub fn pointcut(mut self, pointcut: Arc<dyn Pointcut>) -> Self {
        self.pointcut = Some(pointcut);
        self
    }

    pub fn declaration_order(mut self, order: u32) -> Self {
        self.declaration_order = order;
        self
    }

    pub fn discoverer(mut self, discoverer: Arc<dyn ParameterNameDiscoverer>) -> Self {
        self.discoverer = Some(discoverer);
        self
    }

    pub fn plain<F>(mut self, method: F) -> Self
    where
        F: Fn(&JoinPoint<'_>, &[AdviceArgument]) -> InvocationResult + Send + Sync + 'static,
    {
        self.method = Some(AdviceMethod::Plain(Arc::new(method)));
        self
    }

    pub fn proceeding<F>(mut self, method: F) -> Self
    where
        F: Fn(&mut ProceedingJoinPoint<'_>, &[AdviceArgument]) -> InvocationResult
            + Send
            + Sync
            + 'static,
    {
        self.method = Some(AdviceMethod::Proceeding(Arc::new(method)));
        self
    }

    /// 构建并校验声明的结构
    pub fn build(self) -> Result<Arc<AdviceDeclaration>, AopConfigError> {
        let invalid = |reason: &str| AopConfigError::InvalidDeclaration {
            method: self.method_key.clone(),
            reason: reason.to_string(),
        };

        let is_around = self.advice_type == AdviceType::Around;
        if matches!(self.advice_type, AdviceType::Interceptor | AdviceType::Custom(_)) {
            return Err(invalid("only before, after, after-returning, after-throwing and around advice can be declared"));
        }
        let Some(method) = self.method.clone() else {
            return Err(invalid("no advice method given"));
        };
        if matches!(method, AdviceMethod::Proceeding(_)) != is_around {
            return Err(invalid("around advice, and only around advice, must take a proceeding join point"));
        }
        let proceeding_parameter = self
            .parameter_types
            .iter()
            .any(|t| matches!(t.kind(), ParameterKind::ProceedingJoinPoint));
        if proceeding_parameter && !is_around {
            return Err(invalid("ProceedingJoinPoint is only supported for around advice"));
        }
        if self.returning_name.is_some() && self.advice_type != AdviceType::AfterReturning {
            return Err(invalid("only after-returning advice can bind a returning value"));
        }
        if self.throwing_name.is_some() && self.advice_type != AdviceType::AfterThrowing {
            return Err(invalid("only after-throwing advice can bind a thrown fault"));
        }

        Ok(Arc::new(AdviceDeclaration {
            aspect_name: self.aspect_name,
            method_key: self.method_key,
            advice_type: self.advice_type,
            parameter_types: self.parameter_types,
            argument_names: self.argument_names,
            returning_name: self.returning_name,
            throwing_name: self.throwing_name,
            pointcut: self.pointcut.unwrap_or_else(|| Arc::new(TruePointcut)),
            declaration_order: self.declaration_order,
            discoverer: self.discoverer.unwrap_or_else(default_discoverer),
            method,
            binding: OnceCell::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdvisorAdapterRegistry;
    use crate::advisor::Advisor;
    use crate::chain::{ChainElement, InterceptorChain};
    use crate::operation::value;
    use crate::pointcut::{ExpressionPointcut, PointcutExpression};
    use crate::testing::{
        calculator_invoker, divide_invocation, new_invocation, InsufficientFunds, Recorder,
    };

    fn chain_for(declarations: Vec<Arc<AdviceDeclaration>>) -> InterceptorChain {
        let registry = AdvisorAdapterRegistry::new();
        let mut elements = Vec::new();
        for declaration in declarations {
            let advisor = Advisor::from_declaration(declaration, 0).unwrap();
            for interceptor in registry.interceptors(&advisor).unwrap() {
                elements.push(ChainElement::Interceptor(interceptor));
            }
        }
        InterceptorChain::new(elements)
    }

    #[test]
    fn test_structural_validation() {
        let around_without_proceeding = AdviceDeclaration::builder("A", "a::m", AdviceType::Around)
            .plain(|_, _| Ok(None))
            .build();
        assert!(matches!(
            around_without_proceeding,
            Err(AopConfigError::InvalidDeclaration { .. })
        ));

        let proceeding_on_before = AdviceDeclaration::builder("A", "a::m", AdviceType::Before)
            .parameter(ParameterType::proceeding_join_point())
            .plain(|_, _| Ok(None))
            .build();
        assert!(proceeding_on_before.is_err());

        let returning_on_after = AdviceDeclaration::builder("A", "a::m", AdviceType::After)
            .returning("x")
            .plain(|_, _| Ok(None))
            .build();
        assert!(returning_on_after.is_err());

        let throwing_on_before = AdviceDeclaration::builder("A", "a::m", AdviceType::Before)
            .throwing("e")
            .plain(|_, _| Ok(None))
            .build();
        assert!(throwing_on_before.is_err());

        let missing_method = AdviceDeclaration::builder("A", "a::m", AdviceType::Before).build();
        assert!(missing_method.is_err());
    }

    #[test]
    fn test_parameter_type_matching() {
        assert!(ParameterType::of::<i64>().accepts_value(Some(&value(1i64))));
        assert!(!ParameterType::of::<i64>().accepts_value(Some(&value("x"))));
        assert!(!ParameterType::of::<i64>().accepts_value(None));
        assert!(ParameterType::object().accepts_value(None));

        let fault: Fault = Arc::new(InsufficientFunds);
        assert!(ParameterType::fault::<InsufficientFunds>().accepts_fault(&fault));
        assert!(ParameterType::any_fault().accepts_fault(&fault));
        assert!(!ParameterType::fault::<std::fmt::Error>().accepts_fault(&fault));
    }

    #[test]
    fn test_before_advice_receives_bound_arguments() {
        let recorder = Recorder::default();
        let seen = recorder.clone();
        let declaration = AdviceDeclaration::builder("AuditAspect", "audit::before_add", AdviceType::Before)
            .parameters(vec![ParameterType::join_point(), ParameterType::of::<i64>()])
            .argument_names(["left"])
            .pointcut(Arc::new(ExpressionPointcut::new(PointcutExpression::args(["left", "*"]))))
            .plain(move |jp, args| {
                let left = args[1].downcast_ref::<i64>().copied().unwrap_or_default();
                seen.record(&format!("{} left={}", jp.signature(), left));
                Ok(None)
            })
            .build()
            .unwrap();

        let mut invocation = new_invocation(
            chain_for(vec![declaration]),
            calculator_invoker(),
            vec![value(3i64), value(4i64)],
        );
        invocation.proceed().unwrap();
        assert_eq!(recorder.events(), vec!["Calculator::add left=3"]);
    }

    #[test]
    fn test_after_returning_filters_by_returning_type() {
        let recorder = Recorder::default();
        let typed = recorder.clone();
        let mismatched = recorder.clone();
        let matching = AdviceDeclaration::builder("A", "a::on_i64", AdviceType::AfterReturning)
            .parameter(ParameterType::of::<i64>())
            .argument_names(["result"])
            .returning("result")
            .plain(move |_, args| {
                typed.record(&format!("i64:{:?}", args[0].downcast_ref::<i64>()));
                Ok(None)
            })
            .build()
            .unwrap();
        let other = AdviceDeclaration::builder("A", "a::on_string", AdviceType::AfterReturning)
            .parameter(ParameterType::of::<String>())
            .argument_names(["result"])
            .returning("result")
            .plain(move |_, _| {
                mismatched.record("string");
                Ok(None)
            })
            .build()
            .unwrap();

        let mut invocation = new_invocation(
            chain_for(vec![matching, other]),
            calculator_invoker(),
            vec![value(1i64), value(2i64)],
        );
        invocation.proceed().unwrap();
        assert_eq!(recorder.events(), vec!["i64:Some(3)"]);
    }

    #[test]
    fn test_after_throwing_filters_by_fault_type() {
        let recorder = Recorder::default();
        let handled = recorder.clone();
        let ignored = recorder.clone();
        let arithmetic = AdviceDeclaration::builder("A", "a::on_arithmetic", AdviceType::AfterThrowing)
            .parameter(ParameterType::fault::<crate::testing::ArithmeticFault>())
            .argument_names(["error"])
            .throwing("error")
            .plain(move |_, args| {
                handled.record(&format!("arithmetic:{}", args[0].fault().map(|f| f.to_string()).unwrap_or_default()));
                Ok(None)
            })
            .build()
            .unwrap();
        let funds = AdviceDeclaration::builder("A", "a::on_funds", AdviceType::AfterThrowing)
            .parameter(ParameterType::fault::<InsufficientFunds>())
            .argument_names(["error"])
            .throwing("error")
            .plain(move |_, _| {
                ignored.record("funds");
                Ok(None)
            })
            .build()
            .unwrap();

        let mut invocation =
            divide_invocation(chain_for(vec![arithmetic, funds]), vec![value(1i64), value(0i64)]);
        let err = invocation.proceed().unwrap_err();
        assert!(matches!(err, InvocationError::Thrown(_)));
        assert_eq!(recorder.events(), vec!["arithmetic:division by zero"]);
    }

    #[test]
    fn test_after_throwing_any_fault_sees_argument_mismatch() {
        let recorder = Recorder::default();
        let seen = recorder.clone();
        let declaration = AdviceDeclaration::builder("A", "a::on_any", AdviceType::AfterThrowing)
            .parameter(ParameterType::any_fault())
            .argument_names(["error"])
            .throwing("error")
            .plain(move |_, args| {
                let wrapped = args[0].fault().is_some_and(|f| f.is::<InvocationError>());
                seen.record(&format!("wrapped:{}", wrapped));
                Ok(None)
            })
            .build()
            .unwrap();

        let mut invocation = new_invocation(
            chain_for(vec![declaration]),
            calculator_invoker(),
            vec![value("1"), value(2i64)],
        );
        let err = invocation.proceed().unwrap_err();
        assert!(matches!(err, InvocationError::ArgumentMismatch { index: 0, .. }));
        assert_eq!(recorder.events(), vec!["wrapped:true"]);
    }

    #[test]
    fn test_around_advice_controls_proceed() {
        let declaration = AdviceDeclaration::builder("A", "a::double", AdviceType::Around)
            .parameter(ParameterType::proceeding_join_point())
            .proceeding(|pjp, args| {
                assert!(args[0].is_join_point());
                let result = pjp.proceed()?;
                let doubled = result
                    .as_ref()
                    .and_then(|v| v.downcast_ref::<i64>())
                    .map(|v| v * 2);
                Ok(doubled.map(value))
            })
            .build()
            .unwrap();

        let mut invocation = new_invocation(
            chain_for(vec![declaration]),
            calculator_invoker(),
            vec![value(5i64), value(6i64)],
        );
        let result = invocation.proceed().unwrap().unwrap();
        assert_eq!(result.downcast_ref::<i64>(), Some(&22));
    }

    #[test]
    fn test_binding_failure_surfaces_at_call_time() {
        let declaration = AdviceDeclaration::builder("A", "a::unnamed", AdviceType::Before)
            .parameters(vec![ParameterType::object(), ParameterType::object()])
            .plain(|_, _| Ok(None))
            .build()
            .unwrap();

        let mut invocation = new_invocation(
            chain_for(vec![declaration.clone()]),
            calculator_invoker(),
            vec![value(1i64), value(1i64)],
        );
        let err = invocation.proceed().unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Configuration(AopConfigError::UnresolvedParameterNames { .. })
        ));
        assert!(declaration.argument_binding().is_err());
    }

    #[derive(Default)]
    struct CountingDiscoverer {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ParameterNameDiscoverer for CountingDiscoverer {
        fn parameter_names(&self, _: &AdviceDeclaration) -> Option<Vec<String>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Some(vec!["jp".to_string(), "left".to_string()])
        }
    }

    #[test]
    fn test_binding_computed_once_across_threads() {
        let discoverer = Arc::new(CountingDiscoverer::default());
        let declaration = AdviceDeclaration::builder("A", "a::concurrent", AdviceType::Before)
            .parameters(vec![ParameterType::join_point(), ParameterType::of::<i64>()])
            .pointcut(Arc::new(ExpressionPointcut::new(PointcutExpression::args(["left", "*"]))))
            .discoverer(discoverer.clone())
            .plain(|_, _| Ok(None))
            .build()
            .unwrap();

        let barrier = std::sync::Barrier::new(8);
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        declaration.argument_binding().unwrap() as *const ArgumentBinding as usize
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(discoverer.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[braid_aop_macros::advice]
    fn describe_sum(jp: &JoinPoint<'_>, left: &AdviceArgument, right: &AdviceArgument) -> String {
        format!(
            "{}({:?}, {:?})",
            jp.operation().name(),
            left.downcast_ref::<i64>(),
            right.downcast_ref::<i64>()
        )
    }

    #[test]
    fn test_names_registered_by_attribute_macro() {
        let recorder = Recorder::default();
        let seen = recorder.clone();
        let declaration =
            AdviceDeclaration::builder("AuditAspect", crate::advice_key!(describe_sum), AdviceType::Before)
                .parameters(vec![
                    ParameterType::join_point(),
                    ParameterType::of::<i64>(),
                    ParameterType::of::<i64>(),
                ])
                .pointcut(Arc::new(ExpressionPointcut::new(PointcutExpression::args([
                    "right", "left",
                ]))))
                .plain(move |jp, args| {
                    seen.record(&describe_sum(jp, &args[1], &args[2]));
                    Ok(None)
                })
                .build()
                .unwrap();

        let binding = declaration.argument_binding().unwrap();
        assert!(binding.has_join_point_slot());
        assert_eq!(binding.pointcut_parameter_names().collect::<Vec<_>>(), vec!["left", "right"]);

        let mut invocation = new_invocation(
            chain_for(vec![declaration]),
            calculator_invoker(),
            vec![value(3i64), value(4i64)],
        );
        invocation.proceed().unwrap();
        assert_eq!(recorder.events(), vec!["add(Some(4), Some(3))"]);
    }
}
