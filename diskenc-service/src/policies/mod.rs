// SPDX-License-Identifier: GPL-3.0-only

pub mod validator;

pub use validator::{ParameterValidator, SysBlockDevices, ValidationError};
