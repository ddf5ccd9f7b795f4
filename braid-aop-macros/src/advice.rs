//! #[advice] 宏实现

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Error, FnArg, ItemFn, LitStr, Pat, Result};

pub fn impl_advice(item: ItemFn) -> Result<TokenStream> {
    let fn_name = item.sig.ident.to_string();
    let names = parameter_names(&item)?;
    let names = names
        .iter()
        .map(|name| LitStr::new(name, proc_macro2::Span::call_site()));

    Ok(quote! {
        #item

        ::braid_aop::inventory::submit! {
            ::braid_aop::ParameterNameRegistration::new(
                concat!(module_path!(), "::", #fn_name),
                &[#(#names),*]
            )
        }
    })
}

fn parameter_names(item: &ItemFn) -> Result<Vec<String>> {
    item.sig
        .inputs
        .iter()
        .map(|input| match input {
            FnArg::Receiver(receiver) => Err(Error::new_spanned(
                receiver,
                "#[advice] only supports free functions",
            )),
            FnArg::Typed(typed) => match &*typed.pat {
                Pat::Ident(ident) => {
                    let name = ident.ident.to_string();
                    Ok(name.strip_prefix('_').unwrap_or(&name).to_string())
                }
                other => Err(Error::new_spanned(
                    other,
                    "#[advice] parameters must be plain identifiers",
                )),
            },
        })
        .collect()
}
