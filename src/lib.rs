// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Transactional machine setup.
//!
//! Oxisetup runs a fixed sequence of setup steps, e.g., install the package
//! manager, install packages, write shell and tool configuration. Each step
//! declares the paths it is about to touch. Pre-existing paths are backed up
//! before anything changes, newly created paths are remembered, and if a step
//! fails the user is offered a rollback that puts the machine back the way it
//! was.
//!
//! # Run Layout
//!
//! - [`preflight`] checks run first and abort the run before any mutation.
//! - [`sequencer`] runs the steps in order, failing fast.
//! - [`ledger`] keeps the per-run backups.
//! - [`rollback`] undoes the mutation log on request.
//! - [`report`] writes everything down for later diagnosis.
//!
//! All run state lives in a [`RunContext`] lent to each step in turn.

pub mod config;
pub mod context;
pub mod install;
pub mod ledger;
pub mod path;
pub mod preflight;
pub mod report;
pub mod rollback;
pub mod sequencer;
pub mod steps;
pub mod tools;

mod fsops;

pub use config::{PackageKind, SetupConfig};
pub use context::{InstalledPackageRecord, Mutation, RunContext};
pub use install::{Installation, RunOutcome};
pub use ledger::{BackupKind, BackupLabel, BackupLedger, BackupRecord};
pub use report::{Level, Report};
pub use sequencer::{SetupStep, StepError, StepFailure, StepOutcome, StepSequencer};
