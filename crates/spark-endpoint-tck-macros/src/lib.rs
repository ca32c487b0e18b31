//! `spark_endpoint_tck` 属性宏：为声明了目标套件的模块注入标准化的
//! `#[test]` 入口，避免每个下游仓库手写同样的样板调用。
//!
//! 实现分三步：解析属性里的套件列表、确定默认清单、把测试桩注入目标模块。

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Ident, ItemMod, Meta, Result as SynResult, Token, parse_macro_input};

#[proc_macro_attribute]
/// 让实现 `LowerLayer`/`Filter` 的下游仓库只需声明 `#[spark_endpoint_tck]`，
/// 即可获得完整的契约回归覆盖，而不必逐个套件手写 `#[test]` 函数。
///
/// 解析属性参数（见 `parse_suites`），再调用 `inject_tests` 把 `#[test]`
/// 函数追加到目标模块；解析或注入失败时生成编译期诊断而不是 panic。输入为
/// 属性 `TokenStream` 与模块 `TokenStream`；调用者需保证模块语法正确；成功
/// 时返回的 `TokenStream` 保留原始模块内容并追加测试函数。
pub fn spark_endpoint_tck(attr: TokenStream, item: TokenStream) -> TokenStream {
    let module = parse_macro_input!(item as ItemMod);

    match parse_suites(attr).and_then(|suites| inject_tests(suites, module)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// 解析 `suites(...)` 参数；为空时回退到默认四套件清单。
fn parse_suites(attr: TokenStream) -> SynResult<Vec<Ident>> {
    if attr.is_empty() {
        return Ok(default_suite_idents());
    }

    let meta = syn::parse::<Meta>(attr)?;
    match meta {
        Meta::List(list) if list.path.is_ident("suites") => {
            let nested: Punctuated<Meta, Token![,]> =
                list.parse_args_with(Punctuated::parse_terminated)?;
            let mut suites = Vec::new();
            for meta in nested {
                match meta {
                    Meta::Path(path) => {
                        if let Some(ident) = path.get_ident() {
                            suites.push(ident.clone());
                        } else {
                            return Err(syn::Error::new(path.span(), "suite 需为标识符"));
                        }
                    }
                    other => {
                        return Err(syn::Error::new(other.span(), "suites(...) 仅接受标识符"));
                    }
                }
            }
            if suites.is_empty() {
                Ok(default_suite_idents())
            } else {
                Ok(suites)
            }
        }
        Meta::Path(path) if path.is_ident("suites") => Ok(default_suite_idents()),
        other => Err(syn::Error::new(
            other.span(),
            "spark_endpoint_tck 属性仅支持 suites(...)",
        )),
    }
}

/// 默认套件清单，保持与 `spark_endpoint_tck::all_suites()` 的注册顺序一致。
fn default_suite_idents() -> Vec<Ident> {
    ["open_close", "errors", "retries", "backpressure"]
        .iter()
        .map(|name| Ident::new(name, Span::call_site()))
        .collect()
}

/// 为每个套件生成一个 `#[test] fn {suite}_suite() { spark_endpoint_tck::run_{suite}_suite(); }`
/// 并追加到目标模块，保留模块原有的可见性、属性与既有内容。
fn inject_tests(suites: Vec<Ident>, mut module: ItemMod) -> SynResult<proc_macro2::TokenStream> {
    let mut generated = Vec::new();
    for suite in suites {
        let test_ident = format_ident!("{}_suite", suite);
        let run_fn: syn::Path =
            syn::parse_str(&format!("spark_endpoint_tck::run_{}_suite", suite))?;
        let item: syn::Item = syn::parse_quote! {
            #[test]
            fn #test_ident() {
                #run_fn();
            }
        };
        generated.push(item);
    }

    if let Some((_, ref mut items)) = module.content {
        items.extend(generated);
        Ok(quote! { #module })
    } else {
        let ident = &module.ident;
        let vis = &module.vis;
        let attrs = &module.attrs;
        Ok(quote! {
            #(#attrs)*
            #vis mod #ident {
                #(#generated)*
            }
        })
    }
}
