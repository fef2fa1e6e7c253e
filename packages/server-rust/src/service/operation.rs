//! Operation identifiers, the per-call envelope, and configuration errors.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;

use bookinfo_core::CallContext;
pub use bookinfo_core::OperationError;

/// Boxed future returned by every decorator service.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// OperationId
// ---------------------------------------------------------------------------

/// Closed set of operations exposed by one RPC service.
///
/// Implemented through the `operations!` macro so every service gets a plain
/// enum with stable string names. Names coming from configuration are parsed
/// into this enum once, at load time.
pub trait OperationId: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Every operation of the service, in declaration order.
    const ALL: &'static [Self];

    /// Wire name of the operation (e.g. `"Post"`).
    fn name(self) -> &'static str;

    /// Look up an operation by its wire name.
    #[must_use]
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Declares an operation enum and its [`OperationId`] impl.
macro_rules! operations {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::service::operation::OperationId for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::service::operation::OperationId::name(*self))
            }
        }
    };
}
pub(crate) use operations;

/// Parse configured operation names into typed ids.
///
/// # Errors
///
/// Returns `ConfigError::UnknownExclusion` for the first name that is not an
/// operation of `Op`.
pub fn parse_operations<Op, S>(names: &[S]) -> Result<Vec<Op>, ConfigError>
where
    Op: OperationId,
    S: AsRef<str>,
{
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            Op::parse(name).ok_or_else(|| ConfigError::UnknownExclusion {
                name: name.to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// The value every callable unit receives: the caller's context plus the request.
#[derive(Debug, Clone)]
pub struct Call<Req> {
    pub ctx: CallContext,
    pub request: Req,
}

impl<Req> Call<Req> {
    #[must_use]
    pub fn new(ctx: CallContext, request: Req) -> Self {
        Self { ctx, request }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Startup-time errors. Any of these aborts the process before serving.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("operation '{name}' is already registered")]
    DuplicateOperation { name: &'static str },
    #[error("excluded operation '{name}' does not exist")]
    UnknownExclusion { name: String },
    #[error("operation '{name}' is not registered")]
    UnknownOperation { name: String },
    #[error("invalid {field}: {reason}")]
    InvalidThreshold { field: &'static str, reason: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    operations! {
        enum Shape {
            Circle => "Circle",
            Square => "Square",
        }
    }

    #[test]
    fn names_round_trip_through_parse() {
        for op in Shape::ALL {
            assert_eq!(Shape::parse(op.name()), Some(*op));
        }
        assert_eq!(Shape::parse("Triangle"), None);
        assert_eq!(Shape::Square.to_string(), "Square");
    }

    #[test]
    fn parse_operations_rejects_unknown_name() {
        let names = vec!["Circle".to_string(), "Hexagon".to_string()];
        let err = parse_operations::<Shape, _>(&names).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownExclusion { name } if name == "Hexagon"));
    }

    #[test]
    fn parse_operations_is_case_sensitive() {
        let names = vec!["circle".to_string()];
        assert!(parse_operations::<Shape, _>(&names).is_err());
        let ok = parse_operations::<Shape, _>(&["Circle".to_string()]).unwrap();
        assert_eq!(ok, vec![Shape::Circle]);
    }

    #[test]
    fn parse_operations_accepts_borrowed_names() {
        let ok = parse_operations::<Shape, _>(&["Square", "Circle"]).unwrap();
        assert_eq!(ok, vec![Shape::Square, Shape::Circle]);
        let err = parse_operations::<Shape, _>(&["Oval"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownExclusion { name } if name == "Oval"));
    }
}
