// SPDX-License-Identifier: GPL-3.0-only

pub mod client;
pub mod protocol;
pub mod traits;

pub use protocol::{JobEvent, ParamsError, decode_params, encode_params};
pub use traits::{BackendError, CryptBackend, ProgressReporter};
