//! 通知器（Advisor）
//!
//! 通知器把"何时"（切点）与"做什么"（通知）配对。创建后不再修改，
//! 只有声明顺序与所属切面名称等元数据在创建时设置一次。

use crate::advice::{Advice, AdviceType, MethodInterceptor};
use crate::declaration::AdviceDeclaration;
use crate::error::AopConfigError;
use crate::pointcut::{ClassFilter, Pointcut};
use std::fmt;
use std::sync::Arc;

/// 默认顺序：最低优先级
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 同一切面内部排序所需的信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrecedenceKey {
    aspect_name: String,
    declaration_order: u32,
}

impl PrecedenceKey {
    pub fn new(aspect_name: impl Into<String>, declaration_order: u32) -> Self {
        Self {
            aspect_name: aspect_name.into(),
            declaration_order,
        }
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    pub fn declaration_order(&self) -> u32 {
        self.declaration_order
    }
}

/// 通知器种类
#[derive(Clone)]
pub enum AdvisorKind {
    /// 由切点决定作用范围
    Pointcut(Arc<dyn Pointcut>),

    /// 为目标类型引入新的接口，类型过滤通过即生效
    Introduction {
        class_filter: Arc<dyn ClassFilter>,
        interfaces: Vec<&'static str>,
    },

    /// 无条件作用于所有操作
    Global,
}

/// 通知器
#[derive(Clone)]
pub struct Advisor {
    kind: AdvisorKind,
    advice: Advice,
    order: i32,
    precedence: Option<PrecedenceKey>,
}

impl Advisor {
    /// 切点 + 通知
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            kind: AdvisorKind::Pointcut(pointcut),
            advice,
            order: LOWEST_PRECEDENCE,
            precedence: None,
        }
    }

    /// 作用于所有操作的通知器
    pub fn global(advice: Advice) -> Self {
        Self {
            kind: AdvisorKind::Global,
            advice,
            order: LOWEST_PRECEDENCE,
            precedence: None,
        }
    }

    /// 引入通知器
    pub fn introduction(
        class_filter: Arc<dyn ClassFilter>,
        interfaces: Vec<&'static str>,
        interceptor: Arc<dyn MethodInterceptor>,
    ) -> Self {
        Self {
            kind: AdvisorKind::Introduction {
                class_filter,
                interfaces,
            },
            advice: Advice::Interceptor(interceptor),
            order: LOWEST_PRECEDENCE,
            precedence: None,
        }
    }

    /// 由切面中的通知声明创建通知器
    pub fn from_declaration(
        declaration: Arc<AdviceDeclaration>,
        order: i32,
    ) -> Result<Self, AopConfigError> {
        let advice = match declaration.advice_type() {
            AdviceType::Before => Advice::Before(declaration.clone()),
            AdviceType::After => Advice::After(declaration.clone()),
            AdviceType::AfterReturning => Advice::AfterReturning(declaration.clone()),
            AdviceType::AfterThrowing => Advice::AfterThrowing(declaration.clone()),
            AdviceType::Around => Advice::Around(declaration.clone()),
            other => {
                return Err(AopConfigError::InvalidDeclaration {
                    method: declaration.method_key().to_string(),
                    reason: format!("'{}' advice cannot be declared on an aspect", other),
                })
            }
        };

        Ok(Self {
            kind: AdvisorKind::Pointcut(declaration.pointcut().clone()),
            advice,
            order,
            precedence: Some(PrecedenceKey::new(
                declaration.aspect_name(),
                declaration.declaration_order(),
            )),
        })
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_precedence_key(mut self, key: PrecedenceKey) -> Self {
        self.precedence = Some(key);
        self
    }

    pub fn kind(&self) -> &AdvisorKind {
        &self.kind
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn precedence_key(&self) -> Option<&PrecedenceKey> {
        self.precedence.as_ref()
    }

    pub fn pointcut(&self) -> Option<&Arc<dyn Pointcut>> {
        match &self.kind {
            AdvisorKind::Pointcut(pointcut) => Some(pointcut),
            _ => None,
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self.kind, AdvisorKind::Introduction { .. })
    }

    /// 引入的接口
    pub fn interfaces(&self) -> &[&'static str] {
        match &self.kind {
            AdvisorKind::Introduction { interfaces, .. } => interfaces,
            _ => &[],
        }
    }

    /// 是否为后置类通知
    pub fn is_after_advice(&self) -> bool {
        self.advice.advice_type().is_after()
    }
}

impl PartialEq for Advisor {
    fn eq(&self, other: &Self) -> bool {
        self.advice.same_advice(&other.advice)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            AdvisorKind::Pointcut(pointcut) => pointcut
                .expression()
                .unwrap_or_else(|| "<pointcut>".to_string()),
            AdvisorKind::Introduction { interfaces, .. } => {
                format!("introduction({})", interfaces.join(", "))
            }
            AdvisorKind::Global => "global".to_string(),
        };
        f.debug_struct("Advisor")
            .field("kind", &kind)
            .field("advice", &self.advice)
            .field("order", &self.order)
            .field("precedence", &self.precedence)
            .finish()
    }
}
