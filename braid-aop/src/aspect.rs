//! 切面（Aspect）定义
//!
//! 切面把一组通知声明组织在一起，共享同一个名称和 `order`。
//! 同一切面内的通知按声明顺序决定优先级，见 [`crate::precedence`]。

use crate::advisor::{Advisor, LOWEST_PRECEDENCE};
use crate::declaration::AdviceDeclaration;
use crate::error::AopConfigError;
use std::sync::Arc;

/// 切面 Trait
pub trait Aspect: Send + Sync {
    /// 切面名称
    fn name(&self) -> &str;

    /// 切面优先级，数值越小越先执行
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// 切面中的通知声明
    fn declarations(&self) -> Result<Vec<Arc<AdviceDeclaration>>, AopConfigError>;

    /// 切面提供的引入
    fn introductions(&self) -> Vec<Advisor> {
        Vec::new()
    }

    /// 切面的全部通知器
    fn advisors(&self) -> Result<Vec<Advisor>, AopConfigError> {
        let mut advisors = self
            .declarations()?
            .into_iter()
            .map(|declaration| Advisor::from_declaration(declaration, self.order()))
            .collect::<Result<Vec<_>, _>>()?;
        advisors.extend(
            self.introductions()
                .into_iter()
                .map(|advisor| advisor.with_order(self.order())),
        );
        Ok(advisors)
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
///
/// ```ignore
/// braid_aop::inventory::submit! {
///     braid_aop::AspectRegistration::new("AuditAspect", || std::sync::Arc::new(AuditAspect))
/// }
/// ```
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn Aspect>) -> Self {
        Self { name, creator }
    }

    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.creator)()
    }
}

inventory::collect!(AspectRegistration);

/// 所有通过 inventory 登记的切面
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::AdviceType;
    use crate::advisor::AdvisorKind;
    use crate::pointcut::TruePointcut;

    struct Timing;

    impl Aspect for Timing {
        fn name(&self) -> &str {
            "Timing"
        }

        fn order(&self) -> i32 {
            5
        }

        fn declarations(&self) -> Result<Vec<Arc<AdviceDeclaration>>, AopConfigError> {
            Ok(vec![
                AdviceDeclaration::builder(self.name(), "timing::start", AdviceType::Before)
                    .declaration_order(0)
                    .plain(|_, _| Ok(None))
                    .build()?,
                AdviceDeclaration::builder(self.name(), "timing::stop", AdviceType::After)
                    .declaration_order(1)
                    .plain(|_, _| Ok(None))
                    .build()?,
            ])
        }

        fn introductions(&self) -> Vec<Advisor> {
            vec![Advisor::introduction(
                Arc::new(TruePointcut),
                vec!["Timed"],
                Arc::new(crate::testing::NoopInterceptor),
            )]
        }
    }

    #[test]
    fn test_advisors_carry_aspect_order_and_position() {
        let advisors = Timing.advisors().unwrap();
        assert_eq!(advisors.len(), 3);
        assert!(advisors.iter().all(|advisor| advisor.order() == 5));

        let key = advisors[1].precedence_key().unwrap();
        assert_eq!(key.aspect_name(), "Timing");
        assert_eq!(key.declaration_order(), 1);
        assert!(advisors[1].is_after_advice());
        assert!(matches!(advisors[2].kind(), AdvisorKind::Introduction { .. }));
    }

    #[test]
    fn test_invalid_declaration_fails_advisors() {
        struct Broken;

        impl Aspect for Broken {
            fn name(&self) -> &str {
                "Broken"
            }

            fn declarations(&self) -> Result<Vec<Arc<AdviceDeclaration>>, AopConfigError> {
                Ok(vec![AdviceDeclaration::builder(
                    self.name(),
                    "broken::around",
                    AdviceType::Around,
                )
                .plain(|_, _| Ok(None))
                .build()?])
            }
        }

        assert!(matches!(
            Broken.advisors(),
            Err(AopConfigError::InvalidDeclaration { .. })
        ));
    }
}
