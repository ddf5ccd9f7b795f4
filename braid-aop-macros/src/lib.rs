//! Braid AOP 过程宏
//!
//! - `#[advice]` - 在编译期登记通知函数的参数名

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

mod advice;

/// `#[advice]` 属性宏
///
/// 登记函数的参数名，供 `RegisteredParameterNameDiscoverer` 在绑定通知参数时查找。
/// 登记键为 `module_path!()::函数名`，与 `braid_aop::advice_key!(函数名)` 一致。
/// 参数名开头的一个下划线会被去掉，未使用的参数仍可参与绑定。
///
/// 使用示例：
/// ```ignore
/// use braid_aop::prelude::*;
/// use braid_aop_macros::advice;
///
/// #[advice]
/// fn log_transfer(jp: &JoinPoint<'_>, amount: &AdviceArgument) -> InvocationResult {
///     tracing::info!("{} moved {:?}", jp.signature(), amount.downcast_ref::<u64>());
///     Ok(None)
/// }
///
/// let declaration = AdviceDeclaration::builder("AuditAspect", advice_key!(log_transfer), AdviceType::Before)
///     .parameters(vec![ParameterType::join_point(), ParameterType::of::<u64>()])
///     .plain(|jp, args| log_transfer(jp, &args[1]))
///     .build()?;
/// ```
#[proc_macro_attribute]
pub fn advice(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[advice] does not take arguments",
        )
        .to_compile_error()
        .into();
    }

    let item_fn = parse_macro_input!(item as ItemFn);
    advice::impl_advice(item_fn)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
