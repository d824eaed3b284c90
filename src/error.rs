// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `mcsync` crate.
//!
//! This module provides the error hierarchy shared by every handler: input
//! validation, payload parsing, storage, broker communication and trigger
//! registration, plus the few domain failures of the update ring itself.

use thiserror::Error;

use crate::types::{Mci, OrderId, StepId};

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during input validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while parsing a payload or identifier.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error reported by the step store or the live-state log.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error occurred while talking to the message broker.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Error occurred while registering or removing a recurring trigger.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// I/O failure in the service runtime (socket binding, serving).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The ring has no current step and no step with order 1 to start from.
    #[error("order {order_id} has no current step and no step with order 1 ({steps} steps loaded)")]
    RingWithoutStart {
        /// The order whose ring could not be advanced.
        order_id: OrderId,
        /// Number of steps loaded for the order.
        steps: usize,
    },

    /// No live-state record for the device inside the recovery window.
    #[error("no recent state recorded for {0}")]
    StateNotFound(Mci),
}

/// Errors related to input validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The device identifier is empty.
    #[error("device identifier is empty")]
    EmptyMci,

    /// The device identifier contains characters that cannot appear in a topic level.
    #[error("invalid device identifier {0:?}: must not contain '/', '+', '#' or surrounding whitespace")]
    InvalidMci(String),

    /// A periodic submission carried no steps.
    #[error("periodic state update contains no steps")]
    EmptyBatch,

    /// A step order is not a positive integer.
    #[error("step order {0} is invalid, orders start at 1")]
    InvalidOrder(u32),

    /// Two steps of one submission share an order.
    #[error("step order {0} appears more than once")]
    DuplicateOrder(u32),

    /// No step of a submission has order 1, so the ring could never start.
    #[error("periodic state update has no step with order 1")]
    MissingFirstOrder,
}

/// Errors related to parsing payloads, rows and identifiers.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Unexpected input format.
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors reported by the step store and the live-state log.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found the flag in a different state than expected.
    #[error("condition failed on step {id}: expected is_current = {expected}")]
    ConditionFailed {
        /// The step whose condition was not met.
        id: StepId,
        /// The flag value the write expected to find.
        expected: bool,
    },

    /// A step with this identifier is not stored.
    #[error("step {0} not found")]
    StepNotFound(StepId),

    /// A batch write would overwrite an existing step.
    #[error("step {0} already exists")]
    DuplicateStep(StepId),

    /// A stored row could not be decoded.
    #[error("stored step {id} is corrupt: {source}")]
    Corrupt {
        /// The step whose row failed to decode.
        id: StepId,
        /// The decoding failure.
        source: ParseError,
    },

    /// The backing service is unreachable or refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid topic or topic filter.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// The broker rejected the publish.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to schedule expressions and trigger registration.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The schedule expression is malformed.
    #[error("invalid schedule expression {expression:?}: {reason}")]
    InvalidExpression {
        /// The rejected expression.
        expression: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The named rule does not exist.
    #[error("rule {0} not found")]
    RuleNotFound(String),

    /// The trigger service is unreachable or refused the request.
    #[error("trigger service unavailable: {0}")]
    Unavailable(String),

    /// The permission could not be granted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
