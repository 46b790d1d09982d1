// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test attributes wrapping a test body in a
//! [`btrfs_ctl_test_utils::TestLoggerGuard`].
//!
//! Inside the body a `logger: &mut TestLogger` binding is available. The
//! guard records success when the body returns normally (or returns `Ok`)
//! and failure when it panics or returns `Err`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{ItemFn, ReturnType, Type, parse_macro_input, spanned::Spanned};

/// Plain logged test.
///
/// ```rust,ignore
/// use btrfs_ctl_test_utils::logged_test;
///
/// #[logged_test]
/// fn decodes_reply() {
///     logger.log("running").unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn logged_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    match check_signature(&attr, &input, "logged_test") {
        Ok(()) => expand(input, false),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Logged test that needs a live btrfs mount.
///
/// The body additionally sees `mount: PathBuf`, taken from
/// `BTRFS_CTL_TEST_MOUNT`. When that variable is unset the test prints a
/// skip line and passes without running the body.
///
/// ```rust,ignore
/// use btrfs_ctl_test_utils::btrfs_test;
///
/// #[btrfs_test]
/// fn reads_info() {
///     let fs = btrfs_ctl::Btrfs::open(&mount, true).unwrap();
///     logger.log_json("info", &fs.info().unwrap()).unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn btrfs_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    match check_signature(&attr, &input, "btrfs_test") {
        Ok(()) => expand(input, true),
        Err(err) => err.to_compile_error().into(),
    }
}

fn check_signature(attr: &TokenStream, input: &ItemFn, name: &str) -> syn::Result<()> {
    if !attr.is_empty() {
        return Err(syn::Error::new(
            Span::call_site(),
            format!("#[{}] does not accept arguments", name),
        ));
    }
    if let Some(async_token) = &input.sig.asyncness {
        return Err(syn::Error::new(
            async_token.span(),
            format!("#[{}] cannot be applied to async functions", name),
        ));
    }
    if !input.sig.inputs.is_empty() {
        return Err(syn::Error::new(
            input.sig.ident.span(),
            format!("#[{}] can only be applied to functions without parameters", name),
        ));
    }
    Ok(())
}

fn expand(mut input: ItemFn, needs_mount: bool) -> TokenStream {
    input.attrs.retain(|attr| !is_logged_attr(attr));

    let fn_ident = &input.sig.ident;
    let fn_name = fn_ident.to_string();
    let visibility = &input.vis;
    let generics = &input.sig.generics;
    let block = &input.block;
    let other_attrs = &input.attrs;

    let (return_kind, return_tokens) = classify_return(&input.sig.output);
    let success_body = build_success_body(return_kind);
    let mount_prelude = if needs_mount {
        build_mount_prelude(&fn_name, return_kind)
    } else {
        TokenStream2::new()
    };

    let expanded = quote! {
        #[::core::prelude::v1::test]
        #(#other_attrs)*
        #visibility fn #fn_ident #generics () #return_tokens {
            #mount_prelude
            let mut __guard = ::btrfs_ctl_test_utils::TestLoggerGuard::new(#fn_name)
                .expect("failed to create TestLogger");
            let mut logger = __guard.logger();
            let _ = &mut logger;

            let inner_result = { #block };
            drop(logger);
            #success_body
        }
    };

    expanded.into()
}

fn build_mount_prelude(fn_name: &str, return_kind: ReturnKind) -> TokenStream2 {
    let skip = match return_kind {
        ReturnKind::Result => quote! { return ::std::result::Result::Ok(()); },
        _ => quote! { return; },
    };
    quote! {
        let mount: ::std::path::PathBuf =
            match ::btrfs_ctl_test_utils::require_test_mount(#fn_name) {
                ::std::option::Option::Some(mount) => mount,
                ::std::option::Option::None => { #skip }
            };
        let _ = &mount;
    }
}

#[derive(Clone, Copy)]
enum ReturnKind {
    Unit,
    Result,
    Other,
}

fn classify_return(output: &ReturnType) -> (ReturnKind, TokenStream2) {
    match output {
        ReturnType::Default => (ReturnKind::Unit, quote! {}),
        ReturnType::Type(arrow, ty) => {
            if is_result_type(ty) {
                (ReturnKind::Result, quote! { #arrow #ty })
            } else {
                (ReturnKind::Other, quote! { #arrow #ty })
            }
        }
    }
}

fn is_result_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Result";
        }
    }
    false
}

fn build_success_body(return_kind: ReturnKind) -> TokenStream2 {
    match return_kind {
        ReturnKind::Unit => quote! {
            let _ = inner_result;
            if let Err(e) = __guard.finish_success() {
                panic!("failed to finalize TestLogger: {}", e);
            }
        },
        ReturnKind::Result => quote! {
            match inner_result {
                ::std::result::Result::Ok(value) => {
                    if let Err(e) = __guard.finish_success() {
                        panic!("failed to finalize TestLogger: {}", e);
                    }
                    ::std::result::Result::Ok(value)
                }
                ::std::result::Result::Err(err) => {
                    let __err_msg = format!("{}", err);
                    if let Err(e) = __guard.finish_failure(&__err_msg) {
                        eprintln!("failed to finalize TestLogger after error: {}", e);
                    }
                    ::std::result::Result::Err(err)
                }
            }
        },
        ReturnKind::Other => quote! {
            let value = inner_result;
            if let Err(e) = __guard.finish_success() {
                panic!("failed to finalize TestLogger: {}", e);
            }
            value
        },
    }
}

fn is_logged_attr(attr: &syn::Attribute) -> bool {
    attr.path()
        .get_ident()
        .is_some_and(|ident| ident == "logged_test" || ident == "btrfs_test")
}
