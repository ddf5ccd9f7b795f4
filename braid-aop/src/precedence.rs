//! 通知器优先级
//!
//! 排序只在配置阶段进行一次。跨切面按 `order` 比较（数值越小优先级越高）；
//! 同一切面内 `order` 相同时按声明顺序比较，涉及后置类通知时顺序反转。
//! 其余情况视为"不关心"，比较结果为 [`Ordering::Equal`]，
//! 因此这是偏序而不是全序，排序使用拓扑排序。

use crate::advisor::Advisor;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// 通知器优先级比较器
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecedenceComparator;

impl PrecedenceComparator {
    /// `Less` 表示 `a` 优先级更高（进入时先执行，退出时后执行）
    pub fn compare(&self, a: &Advisor, b: &Advisor) -> Ordering {
        let by_order = a.order().cmp(&b.order());
        if by_order != Ordering::Equal {
            return by_order;
        }

        let (Some(key_a), Some(key_b)) = (a.precedence_key(), b.precedence_key()) else {
            return Ordering::Equal;
        };
        if key_a.aspect_name() != key_b.aspect_name() {
            return Ordering::Equal;
        }

        let delta = i64::from(key_a.declaration_order()) - i64::from(key_b.declaration_order());
        if a.is_after_advice() || b.is_after_advice() {
            // 后声明的后置通知优先级更高
            0i64.cmp(&delta)
        } else {
            delta.cmp(&0)
        }
    }
}

/// 按优先级排序（偏序）
///
/// 只保证比较结果非 `Equal` 的每一对的先后关系；互不约束的通知器保持输入顺序。
/// 约束存在环时记录警告并退化为按 `order` 的稳定排序。
pub fn sort_by_precedence(advisors: Vec<Advisor>) -> Vec<Advisor> {
    let comparator = PrecedenceComparator;
    let n = advisors.len();
    if n < 2 {
        return advisors;
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    for i in 0..n {
        for j in (i + 1)..n {
            match comparator.compare(&advisors[i], &advisors[j]) {
                Ordering::Less => {
                    successors[i].push(j);
                    in_degree[j] += 1;
                }
                Ordering::Greater => {
                    successors[j].push(i);
                    in_degree[i] += 1;
                }
                Ordering::Equal => {}
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &successor in &successors[next] {
            in_degree[successor] -= 1;
            if in_degree[successor] == 0 {
                ready.insert(successor);
            }
        }
    }

    if order.len() != n {
        tracing::warn!(
            advisors = n,
            "Precedence constraints between advisors form a cycle, falling back to ordering by 'order' only"
        );
        let mut advisors = advisors;
        advisors.sort_by_key(Advisor::order);
        return advisors;
    }

    let mut slots: Vec<Option<Advisor>> = advisors.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::advisor::PrecedenceKey;
    use crate::testing::{NoopAfter, NoopBefore};

    fn before(aspect: &str, position: u32, order: i32) -> Advisor {
        Advisor::global(Advice::before(NoopBefore))
            .with_order(order)
            .with_precedence_key(PrecedenceKey::new(aspect, position))
    }

    fn after(aspect: &str, position: u32, order: i32) -> Advisor {
        Advisor::global(Advice::after(NoopAfter))
            .with_order(order)
            .with_precedence_key(PrecedenceKey::new(aspect, position))
    }

    fn position_of(sorted: &[Advisor], advisor: &Advisor) -> usize {
        sorted.iter().position(|a| a == advisor).unwrap()
    }

    #[test]
    fn test_lower_order_runs_first() {
        let low = before("A", 1, 1);
        let high = before("B", 1, 10);
        assert_eq!(PrecedenceComparator.compare(&low, &high), Ordering::Less);

        let sorted = sort_by_precedence(vec![high.clone(), low.clone()]);
        assert!(position_of(&sorted, &low) < position_of(&sorted, &high));
    }

    #[test]
    fn test_same_aspect_after_advice_tie_break() {
        let first = after("Audit", 1, 0);
        let second = after("Audit", 2, 0);
        assert_eq!(PrecedenceComparator.compare(&first, &second), Ordering::Greater);

        let sorted = sort_by_precedence(vec![first.clone(), second.clone()]);
        assert!(position_of(&sorted, &second) < position_of(&sorted, &first));
    }

    #[test]
    fn test_same_aspect_non_after_tie_break() {
        let first = before("Audit", 1, 0);
        let second = before("Audit", 2, 0);
        assert_eq!(PrecedenceComparator.compare(&first, &second), Ordering::Less);

        let sorted = sort_by_precedence(vec![second.clone(), first.clone()]);
        assert!(position_of(&sorted, &first) < position_of(&sorted, &second));
    }

    #[test]
    fn test_unconstrained_pairs_are_equal() {
        let same_position = before("Audit", 1, 0);
        let other = before("Audit", 1, 0);
        assert_eq!(PrecedenceComparator.compare(&same_position, &other), Ordering::Equal);

        let cross_aspect = before("Security", 1, 0);
        assert_eq!(PrecedenceComparator.compare(&same_position, &cross_aspect), Ordering::Equal);

        let unkeyed = Advisor::global(Advice::before(NoopBefore)).with_order(0);
        assert_eq!(PrecedenceComparator.compare(&unkeyed, &same_position), Ordering::Equal);
    }

    #[test]
    fn test_only_constrained_pairs_are_asserted() {
        let audit_before = before("Audit", 1, 0);
        let audit_after = after("Audit", 2, 0);
        let security = before("Security", 1, -5);
        let timing = before("Timing", 1, 0);

        let sorted = sort_by_precedence(vec![
            audit_before.clone(),
            timing.clone(),
            audit_after.clone(),
            security.clone(),
        ]);

        assert_eq!(sorted.len(), 4);
        assert!(position_of(&sorted, &security) < position_of(&sorted, &audit_before));
        assert!(position_of(&sorted, &security) < position_of(&sorted, &timing));
        assert!(position_of(&sorted, &audit_after) < position_of(&sorted, &audit_before));
    }

    #[test]
    fn test_cycle_falls_back_to_order() {
        // before(1) < before(3)，但 after(2) 与两者的关系方向相反
        let a = before("Audit", 1, 0);
        let b = after("Audit", 2, 0);
        let c = before("Audit", 3, 0);
        let d = before("Other", 1, -1);

        let sorted = sort_by_precedence(vec![a.clone(), b.clone(), c.clone(), d.clone()]);
        assert_eq!(sorted.len(), 4);
        assert_eq!(sorted[0], d);
    }
}
