// SPDX-License-Identifier: GPL-3.0-only

pub mod engine;
mod pipeline;
pub mod resume;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::JobEngine;
pub use resume::ResumeCoordinator;
