//! 切面注册表
//!
//! 保存已注册切面的通知器，按优先级排序后交给 [`ProxyFactory`]。

use crate::advisor::{Advisor, AdvisorKind};
use crate::aspect::Aspect;
use crate::error::AopConfigError;
use crate::precedence::sort_by_precedence;
use crate::proxy::ProxyFactory;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// 全局切面注册表
///
/// 首次访问时加载所有通过 inventory 登记的切面
static GLOBAL_ASPECT_REGISTRY: Lazy<Arc<AspectRegistry>> = Lazy::new(|| {
    let registry = AspectRegistry::new();
    registry.auto_load_aspects();
    Arc::new(registry)
});

/// 获取全局切面注册表
pub fn get_global_registry() -> &'static Arc<AspectRegistry> {
    &GLOBAL_ASPECT_REGISTRY
}

struct AspectEntry {
    aspect: Arc<dyn Aspect>,
    advisors: Vec<Advisor>,
}

/// 切面注册表
pub struct AspectRegistry {
    entries: RwLock<Vec<AspectEntry>>,
}

impl AspectRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 注册切面，切面的通知器在注册时生成并校验
    pub fn register(&self, aspect: Arc<dyn Aspect>) -> Result<(), AopConfigError> {
        let advisors = aspect.advisors()?;
        tracing::debug!(
            aspect = aspect.name(),
            order = aspect.order(),
            advisors = advisors.len(),
            "Registering aspect"
        );

        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.aspect.name() == aspect.name()) {
            tracing::warn!("Aspect '{}' is registered more than once", aspect.name());
        }
        entries.push(AspectEntry { aspect, advisors });
        Ok(())
    }

    /// 批量注册，遇到第一个错误即停止
    pub fn register_all(
        &self,
        aspects: impl IntoIterator<Item = Arc<dyn Aspect>>,
    ) -> Result<(), AopConfigError> {
        for aspect in aspects {
            self.register(aspect)?;
        }
        Ok(())
    }

    /// 从 inventory 加载所有登记的切面，返回成功加载的个数
    ///
    /// 单个切面配置错误只记录日志，不影响其他切面
    pub fn auto_load_aspects(&self) -> usize {
        let registrations: Vec<_> = crate::aspect::get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        let mut loaded = 0;
        for registration in registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            match self.register(registration.create_instance()) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::error!("Failed to load aspect '{}': {}", registration.name, e),
            }
        }

        tracing::info!("Auto-loaded {} aspect(s)", loaded);
        loaded
    }

    /// 按优先级排序的全部通知器
    pub fn advisors(&self) -> Vec<Advisor> {
        let all = self
            .entries
            .read()
            .iter()
            .flat_map(|entry| entry.advisors.iter().cloned())
            .collect();
        sort_by_precedence(all)
    }

    /// 可能作用于 `target_type` 的通知器（只按类型过滤），按优先级排序
    pub fn eligible_advisors(&self, target_type: &str) -> Vec<Advisor> {
        self.advisors()
            .into_iter()
            .filter(|advisor| match advisor.kind() {
                AdvisorKind::Pointcut(pointcut) => pointcut.class_filter().matches(target_type),
                AdvisorKind::Introduction { class_filter, .. } => class_filter.matches(target_type),
                AdvisorKind::Global => true,
            })
            .collect()
    }

    /// 把适用于目标类型的通知器加入代理工厂
    pub fn advise(&self, factory: ProxyFactory, target_type: &str) -> ProxyFactory {
        self.eligible_advisors(target_type)
            .into_iter()
            .fold(factory, ProxyFactory::add_advisor)
    }

    pub fn aspect_names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.aspect.name().to_string())
            .collect()
    }

    /// 获取注册的切面数量
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
