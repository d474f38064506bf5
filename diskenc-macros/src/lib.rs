// SPDX-License-Identifier: GPL-3.0-only

//! Procedural macros for diskenc-service D-Bus authorization
//!
//! `#[authorized_interface(action = "...")]` goes on methods inside a
//! `#[zbus::interface]` impl block. The method must take
//! `#[zbus(connection)]` and `#[zbus(header)]` parameters:
//!
//! ```rust,ignore
//! #[interface(name = "org.cosmic.ext.DiskEncrypt.Service.DiskEncrypt")]
//! impl DiskEncryptHandler {
//!     #[authorized_interface(action = "org.cosmic.ext.diskenc.service.decrypt")]
//!     async fn decrypt_disk(
//!         &self,
//!         #[zbus(connection)] connection: &Connection,
//!         #[zbus(header)] header: MessageHeader<'_>,
//!         params: HashMap<String, OwnedValue>,
//!     ) -> zbus::fdo::Result<String> {
//!         tracing::info!("decrypt requested by UID {}", caller.uid);
//!     }
//! }
//! ```
//!
//! The expansion asks `crate::auth::authorize_caller` to run the Polkit check
//! for the real sender, binds the returned `caller: CallerInfo` and then runs
//! the original body. Denied callers get `AccessDenied` before any parameter
//! is looked at.

mod emit;
mod parse;
mod transform;

use proc_macro::TokenStream;
use syn::{ItemFn, parse_macro_input};

use parse::AuthorizedInterfaceArgs;
use transform::transform_method;

#[proc_macro_attribute]
pub fn authorized_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AuthorizedInterfaceArgs);
    let method = parse_macro_input!(item as ItemFn);

    transform_method(&args.action, &method).into()
}
