// SPDX-License-Identifier: GPL-3.0-only

pub mod events;
pub mod params;

pub use events::JobEvent;
pub use params::{ParamsError, decode_params, encode_params};
