// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Datadog Trace Pipeline
//!
//! Processing and admission control of the traces received by the agent.
//!
//! Traces handed to the [`receiver::IntakeHandle`] are pre-sampled, then read
//! by the [`agent::Agent`] coordinator which filters, obfuscates and shapes
//! them before fanning them out to the stats, service metadata and sampling
//! consumers. The [`watchdog::Watchdog`] guards the process resources and
//! drives the intake pre-sample rate.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod filters;
pub mod info;
pub mod obfuscate;
pub mod receiver;
pub mod sampler;
pub mod service_extractor;
pub mod span;
pub mod stats;
pub mod trace;
pub mod trace_shaper;
pub mod watchdog;
