// SPDX-License-Identifier: GPL-3.0-only

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Ident, ItemFn};

pub(crate) fn emit_authorized_method(
    action_id: &str,
    method: &ItemFn,
    connection: &Ident,
    header: &Ident,
) -> TokenStream2 {
    let attrs = &method.attrs;
    let vis = &method.vis;
    let sig = &method.sig;
    let method_name = &sig.ident;
    let original_block = &method.block;

    let inputs: Vec<_> = sig.inputs.iter().collect();
    let generics = &sig.generics;
    let output = &sig.output;

    quote! {
        #(#attrs)*
        #[allow(clippy::too_many_arguments)]
        #vis async fn #method_name #generics ( #(#inputs),* ) #output {
            #[allow(unused_variables)]
            let caller: diskenc_types::CallerInfo =
                crate::auth::authorize_caller(#connection, &#header, #action_id).await?;

            #original_block
        }
    }
}
