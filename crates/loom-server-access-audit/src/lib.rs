// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod error;
pub mod event;
pub mod pipeline;
pub mod sink;

pub use error::{AuditError, AuditResult, AuditSinkError};
pub use event::{AccessEventType, AccessLogBuilder, AccessLogEntry, AuditSeverity};
pub use pipeline::AuditService;
pub use sink::{AuditSink, MemorySink, TracingAuditSink};
