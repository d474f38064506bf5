// SPDX-License-Identifier: GPL-3.0-only

pub mod cryptsetup;

pub use cryptsetup::CryptsetupBackend;
