// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::protocol::ParamsError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("D-Bus call failed: {0}")]
    Call(#[from] zbus::Error),

    #[error("invalid parameters: {0}")]
    Params(#[from] ParamsError),

    #[error("parse error: {0}")]
    ParseError(String),
}
