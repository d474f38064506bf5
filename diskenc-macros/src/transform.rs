// SPDX-License-Identifier: GPL-3.0-only

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{FnArg, Ident, ItemFn, Pat};

use crate::emit::emit_authorized_method;

/// Which zbus special parameter an argument is
///
/// `#[interface]` expands first and strips `#[zbus(..)]` from parameters, so
/// the conventional names are accepted as well.
fn zbus_role(attrs: &[syn::Attribute], name: &Ident) -> Option<&'static str> {
    for attr in attrs {
        if !attr.path().is_ident("zbus") {
            continue;
        }
        let syn::Meta::List(list) = &attr.meta else {
            continue;
        };
        let tokens = list.tokens.to_string();
        if tokens.trim() == "connection" {
            return Some("connection");
        }
        if tokens.trim() == "header" {
            return Some("header");
        }
    }
    match name.to_string().trim_start_matches('_') {
        "connection" => Some("connection"),
        "header" => Some("header"),
        _ => None,
    }
}

pub(crate) fn transform_method(action_id: &str, method: &ItemFn) -> TokenStream2 {
    let sig = &method.sig;

    if sig.asyncness.is_none() {
        return quote! {
            compile_error!("#[authorized_interface] only supports async methods");
        };
    }

    let mut connection: Option<Ident> = None;
    let mut header: Option<Ident> = None;

    for arg in &sig.inputs {
        let FnArg::Typed(pat_type) = arg else {
            continue;
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            continue;
        };
        match zbus_role(&pat_type.attrs, &pat_ident.ident) {
            Some("connection") => connection = Some(pat_ident.ident.clone()),
            Some("header") => header = Some(pat_ident.ident.clone()),
            _ => {}
        }
    }

    let (Some(connection), Some(header)) = (connection, header) else {
        return quote! {
            compile_error!("#[authorized_interface] requires #[zbus(connection)] and #[zbus(header)] parameters");
        };
    };

    emit_authorized_method(action_id, method, &connection, &header)
}
