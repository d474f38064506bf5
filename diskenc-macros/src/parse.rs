// SPDX-License-Identifier: GPL-3.0-only

use syn::{Ident, LitStr, Result as SynResult, Token, parse::Parse, parse::ParseStream};

pub(crate) struct AuthorizedInterfaceArgs {
    pub(crate) action: String,
}

impl Parse for AuthorizedInterfaceArgs {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let ident: Ident = input.parse()?;
        if ident != "action" {
            return Err(syn::Error::new(
                ident.span(),
                "expected `action = \"<polkit action id>\"`",
            ));
        }
        let _: Token![=] = input.parse()?;
        let lit: LitStr = input.parse()?;

        let action = lit.value();
        if action.trim().is_empty() {
            return Err(syn::Error::new(lit.span(), "action id must not be empty"));
        }

        Ok(AuthorizedInterfaceArgs { action })
    }
}
