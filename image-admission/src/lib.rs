// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Admission decisions for pods whose images must be signed through a
//! notary (TUF) trust server.
//!
//! The entry point is [`validator::Validator`], which walks the containers of
//! a [`pod::Pod`], consults the cached registry security policies and
//! whitelists, fetches trust data through a [`trust::SignatureFetcher`] and
//! pins every verified image to its signed digest.

pub mod auth;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod patch;
pub mod pod;
pub mod reference;
pub mod signer;
pub mod trust;
pub mod validator;

pub use error::{Error, Result};
pub use validator::{DenyReason, Validator, Verdict};
