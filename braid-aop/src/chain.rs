//! 拦截器链构建
//!
//! [`AdvisorChainFactory`] 针对一个（操作，目标类型）组合从通知器集合中筛选出适用的拦截器。
//! 构建过程无副作用，可以并发调用，结果可以按该组合缓存。

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::MethodInterceptor;
use crate::advisor::{Advisor, AdvisorKind};
use crate::error::AopConfigError;
use crate::operation::Operation;
use crate::pointcut::MethodMatcher;
use std::fmt;
use std::sync::Arc;

/// 链上的一个元素
#[derive(Clone)]
pub enum ChainElement {
    /// 静态匹配已确定的拦截器
    Interceptor(Arc<dyn MethodInterceptor>),

    /// 每次调用时还需用运行时参数重新匹配
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainElement {
    pub fn interceptor<I: MethodInterceptor + 'static>(interceptor: I) -> Self {
        ChainElement::Interceptor(Arc::new(interceptor))
    }

    pub fn dynamic(
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    ) -> Self {
        ChainElement::Dynamic {
            interceptor,
            matcher,
        }
    }

    pub fn method_interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor(interceptor) => interceptor,
            ChainElement::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic { .. })
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor(i) => f.debug_tuple("Interceptor").field(&i.name()).finish(),
            ChainElement::Dynamic { interceptor, .. } => {
                f.debug_tuple("Dynamic").field(&interceptor.name()).finish()
            }
        }
    }
}

/// 有序拦截器链，克隆只增加引用计数
#[derive(Clone)]
pub struct InterceptorChain {
    elements: Arc<[ChainElement]>,
}

impl InterceptorChain {
    pub fn new(elements: Vec<ChainElement>) -> Self {
        Self {
            elements: elements.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChainElement> {
        self.elements.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChainElement> {
        self.elements.iter()
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elements.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a InterceptorChain {
    type Item = &'a ChainElement;
    type IntoIter = std::slice::Iter<'a, ChainElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 拦截器链工厂
#[derive(Clone)]
pub struct AdvisorChainFactory {
    registry: Arc<AdvisorAdapterRegistry>,
}

impl AdvisorChainFactory {
    pub fn new(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AdvisorAdapterRegistry> {
        &self.registry
    }

    /// 构建拦截器链
    ///
    /// 输出保持输入顺序，排序由优先级比较器在配置阶段完成。
    /// `target_type` 为空时使用操作的声明类型；`pre_filtered` 为 true 时跳过类型过滤。
    pub fn build(
        &self,
        advisors: &[Advisor],
        operation: &Operation,
        target_type: Option<&'static str>,
        pre_filtered: bool,
    ) -> Result<InterceptorChain, AopConfigError> {
        let actual_type = target_type.unwrap_or_else(|| operation.declaring_type());
        let mut elements = Vec::with_capacity(advisors.len());
        let mut has_introductions: Option<bool> = None;

        for advisor in advisors {
            match advisor.kind() {
                AdvisorKind::Pointcut(pointcut) => {
                    if !pre_filtered && !pointcut.class_filter().matches(actual_type) {
                        continue;
                    }

                    let matcher = pointcut.method_matcher();
                    let matched = if matcher.is_introduction_aware() {
                        let introductions = *has_introductions
                            .get_or_insert_with(|| has_matching_introduction(advisors, actual_type));
                        matcher.matches_with_introductions(operation, actual_type, introductions)
                    } else {
                        matcher.matches(operation, actual_type)
                    };
                    if !matched {
                        continue;
                    }

                    let interceptors = self.registry.interceptors(advisor)?;
                    if matcher.is_runtime() {
                        elements.extend(
                            interceptors
                                .into_iter()
                                .map(|interceptor| ChainElement::dynamic(interceptor, matcher.clone())),
                        );
                    } else {
                        elements.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                    }
                }
                AdvisorKind::Introduction { class_filter, .. } => {
                    if pre_filtered || class_filter.matches(actual_type) {
                        let interceptors = self.registry.interceptors(advisor)?;
                        elements.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                    }
                }
                AdvisorKind::Global => {
                    let interceptors = self.registry.interceptors(advisor)?;
                    elements.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                }
            }
        }

        tracing::debug!(
            operation = %operation.signature(),
            target_type = actual_type,
            advisors = advisors.len(),
            interceptors = elements.len(),
            "Built interceptor chain"
        );
        Ok(InterceptorChain::new(elements))
    }
}

impl Default for AdvisorChainFactory {
    fn default() -> Self {
        Self::new(AdvisorAdapterRegistry::global().clone())
    }
}

fn has_matching_introduction(advisors: &[Advisor], actual_type: &str) -> bool {
    advisors.iter().any(|advisor| match advisor.kind() {
        AdvisorKind::Introduction { class_filter, .. } => class_filter.matches(actual_type),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::operation::Value;
    use crate::pointcut::{ClassFilter, ExpressionPointcut, Pointcut, PointcutExpression};
    use crate::testing::{NoopBefore, NoopInterceptor, ADD, CALCULATOR};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn advisor(expression: PointcutExpression) -> Advisor {
        Advisor::new(
            Arc::new(ExpressionPointcut::new(expression)),
            Advice::interceptor(NoopInterceptor),
        )
    }

    fn interceptor_ptr(element: &ChainElement) -> *const () {
        Arc::as_ptr(element.method_interceptor()) as *const ()
    }

    fn advice_ptr(advisor: &Advisor) -> *const () {
        match advisor.advice() {
            Advice::Interceptor(i) => Arc::as_ptr(i) as *const (),
            _ => std::ptr::null(),
        }
    }

    /// 记录 has_introductions 参数的匹配器
    struct IntroductionAware {
        seen: Arc<AtomicUsize>,
    }

    impl MethodMatcher for IntroductionAware {
        fn matches(&self, _: &Operation, _: &str) -> bool {
            false
        }

        fn is_introduction_aware(&self) -> bool {
            true
        }

        fn matches_with_introductions(&self, _: &Operation, _: &str, has_introductions: bool) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst);
            has_introductions
        }
    }

    struct IntroductionAwarePointcut(Arc<IntroductionAware>);

    impl Pointcut for IntroductionAwarePointcut {
        fn class_filter(&self) -> Arc<dyn ClassFilter> {
            Arc::new(crate::pointcut::TruePointcut)
        }

        fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
            self.0.clone()
        }
    }

    #[test]
    fn test_no_matching_advisor_gives_empty_chain() {
        let advisors = vec![
            advisor(PointcutExpression::within("OrderService")),
            advisor(PointcutExpression::method("subtract")),
        ];
        let chain = AdvisorChainFactory::default()
            .build(&advisors, &ADD, Some(CALCULATOR), false)
            .unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_static_matches_preserve_input_order() {
        let advisors = vec![
            advisor(PointcutExpression::method("add")).with_order(3),
            advisor(PointcutExpression::within("Calc*")).with_order(1),
            advisor(PointcutExpression::All).with_order(2),
        ];
        let chain = AdvisorChainFactory::default()
            .build(&advisors, &ADD, Some(CALCULATOR), false)
            .unwrap();

        assert_eq!(chain.len(), 3);
        for (element, advisor) in chain.iter().zip(&advisors) {
            assert!(!element.is_dynamic());
            assert_eq!(interceptor_ptr(element), advice_ptr(advisor));
        }
    }

    #[test]
    fn test_runtime_matcher_produces_dynamic_element() {
        let advisors = vec![advisor(PointcutExpression::runtime(|_, args: &[Value]| {
            !args.is_empty()
        }))];
        let chain = AdvisorChainFactory::default()
            .build(&advisors, &ADD, Some(CALCULATOR), false)
            .unwrap();

        assert_eq!(chain.len(), 1);
        assert!(chain.get(0).unwrap().is_dynamic());
    }

    struct RejectAllTypes;

    impl ClassFilter for RejectAllTypes {
        fn matches(&self, _target_type: &str) -> bool {
            false
        }
    }

    struct TypeRestricted;

    impl Pointcut for TypeRestricted {
        fn class_filter(&self) -> Arc<dyn ClassFilter> {
            Arc::new(RejectAllTypes)
        }

        fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
            Arc::new(crate::pointcut::TruePointcut)
        }
    }

    #[test]
    fn test_pre_filtered_skips_class_filter() {
        let advisors = vec![Advisor::new(
            Arc::new(TypeRestricted),
            Advice::interceptor(NoopInterceptor),
        )];
        let factory = AdvisorChainFactory::default();

        assert!(factory.build(&advisors, &ADD, Some(CALCULATOR), false).unwrap().is_empty());
        assert_eq!(factory.build(&advisors, &ADD, Some(CALCULATOR), true).unwrap().len(), 1);
    }

    #[test]
    fn test_introductions_and_global_advisors() {
        let advisors = vec![
            Advisor::introduction(
                Arc::new(ExpressionPointcut::new(PointcutExpression::within("Calc*"))).class_filter(),
                vec!["Auditable"],
                Arc::new(NoopInterceptor),
            ),
            Advisor::introduction(
                Arc::new(ExpressionPointcut::new(PointcutExpression::within("Order*"))).class_filter(),
                vec!["Lockable"],
                Arc::new(NoopInterceptor),
            ),
            Advisor::global(Advice::before(NoopBefore)),
        ];
        let chain = AdvisorChainFactory::default()
            .build(&advisors, &ADD, Some(CALCULATOR), false)
            .unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_introduction_flag_computed_and_passed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let matcher = Arc::new(IntroductionAware { seen: seen.clone() });
        let aware = || {
            Advisor::new(
                Arc::new(IntroductionAwarePointcut(matcher.clone())),
                Advice::interceptor(NoopInterceptor),
            )
        };
        let introduction = Advisor::introduction(
            Arc::new(crate::pointcut::TruePointcut),
            vec!["Auditable"],
            Arc::new(NoopInterceptor),
        );
        let factory = AdvisorChainFactory::default();

        let without = factory.build(&[aware(), aware()], &ADD, None, false).unwrap();
        assert!(without.is_empty());

        let with = factory
            .build(&[aware(), introduction, aware()], &ADD, None, false)
            .unwrap();
        assert_eq!(with.len(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_unknown_advice_fails_chain_build() {
        let advisors = vec![Advisor::global(Advice::Custom {
            tag: "unregistered",
            advice: Arc::new(()),
        })];
        let err = AdvisorChainFactory::new(Arc::new(AdvisorAdapterRegistry::new()))
            .build(&advisors, &ADD, Some(CALCULATOR), false)
            .unwrap_err();
        assert!(matches!(err, AopConfigError::UnknownAdviceType(_)));
    }
}
