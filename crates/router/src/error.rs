//! Error types shared by registration and request dispatch.
//!
//! Two families exist:
//!
//! - [`RouterError`]: configuration problems detected while routes, filters or
//!   collaborators are registered. They are returned from the builders and are
//!   meant to abort startup.
//! - [`HandlerError`]: failures raised while a single request is processed by a
//!   filter, a handler or a controller lifecycle hook. They travel up to the
//!   dispatcher's recovery boundary, where the [`Display`](std::fmt::Display) text of
//!   the error is compared against the registered exception codes.

use std::any::Any;
use std::error::Error;
use thiserror::Error;

/// A boxed, thread safe error, used for collaborator failures.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The result every filter, handler and lifecycle hook returns.
pub type HandlerResult = Result<(), HandlerError>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("method mapping format is invalid: '{mapping}'")]
    InvalidMapping { mapping: String },

    #[error("'{capability}' method doesn't exist in the controller {controller}")]
    UnknownCapability { capability: String, controller: String },

    #[error("'{method}' is an invalid method mapping, not supported http method")]
    UnsupportedMethod { method: String },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid regex '{regex}' in route pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        regex: String,
        #[source]
        source: regex::Error,
    },

    #[error("{name} must be set when {option} is enabled")]
    MissingCollaborator { name: &'static str, option: &'static str },
}

impl RouterError {
    pub fn invalid_mapping<S: ToString>(mapping: S) -> Self {
        Self::InvalidMapping { mapping: mapping.to_string() }
    }

    pub fn unknown_capability<C: ToString, N: ToString>(capability: C, controller: N) -> Self {
        Self::UnknownCapability { capability: capability.to_string(), controller: controller.to_string() }
    }

    pub fn unsupported_method<S: ToString>(method: S) -> Self {
        Self::UnsupportedMethod { method: method.to_string() }
    }

    pub fn invalid_pattern<P: ToString, R: ToString>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The response has been finalized on purpose; the dispatcher swallows it.
    #[error("user stop run")]
    Abort,

    /// A textual exception code such as `"404"` or `"db_error"`.
    #[error("{0}")]
    Code(String),

    #[error("render failed: {source}")]
    Render { source: BoxError },

    #[error("'{capability}' method doesn't exist in the controller {controller}")]
    UnknownCapability { capability: String, controller: String },

    #[error(transparent)]
    Fault(BoxError),

    /// A panic caught at the recovery boundary, carrying the panic message.
    #[error("{0}")]
    Panic(String),
}

impl HandlerError {
    /// Builds an error whose textual identity is `code`, used to select an error page.
    pub fn code<S: ToString>(code: S) -> Self {
        Self::Code(code.to_string())
    }

    pub fn render<E: Into<BoxError>>(e: E) -> Self {
        Self::Render { source: e.into() }
    }

    pub fn fault<E: Into<BoxError>>(e: E) -> Self {
        Self::Fault(e.into())
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }

    /// Converts a panic payload into a handler error.
    ///
    /// A payload raised with `std::panic::panic_any(HandlerError::..)` keeps its variant,
    /// string payloads become [`HandlerError::Panic`].
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<HandlerError>() {
            Ok(e) => return *e,
            Err(payload) => payload,
        };

        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Self::Panic((*s).to_string())
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::Panic(s.clone())
        } else {
            Self::Panic("unknown panic".into())
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::Fault(Box::new(e))
    }
}

impl From<BoxError> for HandlerError {
    fn from(e: BoxError) -> Self {
        Self::Fault(e)
    }
}

#[cfg(test)]
mod tests {
    use super::HandlerError;

    #[test]
    fn textual_identity_of_code_is_the_code() {
        assert_eq!(HandlerError::code("404").to_string(), "404");
        assert_eq!(HandlerError::Panic("db_down".into()).to_string(), "db_down");
    }

    #[test]
    fn panic_payloads_keep_their_text() {
        let from_str = HandlerError::from_panic(Box::new("boom"));
        assert_eq!(from_str.to_string(), "boom");

        let from_string = HandlerError::from_panic(Box::new(String::from("401")));
        assert_eq!(from_string.to_string(), "401");

        let from_error = HandlerError::from_panic(Box::new(HandlerError::Abort));
        assert!(from_error.is_abort());

        let unknown = HandlerError::from_panic(Box::new(42_u32));
        assert_eq!(unknown.to_string(), "unknown panic");
    }

    #[test]
    fn io_error_becomes_fault() {
        let e: HandlerError = std::io::Error::other("disk gone").into();
        assert!(matches!(e, HandlerError::Fault(_)));
        assert_eq!(e.to_string(), "disk gone");
    }
}
