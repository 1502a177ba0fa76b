// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod blacklister;
pub mod replacer;

pub use blacklister::Blacklister;
pub use replacer::{ReplaceRule, Replacer};
