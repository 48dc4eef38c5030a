//! # Error Handling Framework
//!
//! A structured error system shared by every component of the erasure
//! orchestration engine: workflow execution, adapter dispatch, scheduling,
//! audit chain integrity, and policy validation.
//!
//! ## Core Features
//!
//! - **Structured Error Codes**: Numeric ranges per category, each carrying
//!   an HTTP status, a retry hint, and a logging hint.
//! - **Rich Context**: Correlation IDs, trace breadcrumbs, and free-form
//!   metadata attached to every error.
//! - **Severity Classification**: Low/Medium/High/Critical drives both the
//!   tracing level an error is logged at and whether it moves the error-rate
//!   needle in [`ErrorMetrics`].
//! - **Environment-Aware Sanitization**: `to_api_response_with_environment`
//!   strips internal detail in production while keeping it in development.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use erasure_core::error::{Error, ErrorCode, Result};
//!
//! fn admit_request(already_pending: bool) -> Result<()> {
//!     if already_pending {
//!         return Err(Error::new(ErrorCode::AdmissionConflict, "duplicate erasure request"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod context;
pub mod framework;
pub mod metrics;

pub use codes::ErrorCode;
pub use context::{ErrorContext, RequestContext};
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};
pub use metrics::ErrorMetrics;
