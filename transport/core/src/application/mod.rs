// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dispatcher;
pub mod verification;

pub use dispatcher::{DispatchReply, SessionDispatcher};
pub use verification::{
    DenialReporter, LogDenialReporter, VerificationGate, VerificationMode, VerifiedIdentity,
};
