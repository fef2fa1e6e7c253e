//! Endpoint set: the named collection of a service's callable units.

use std::collections::HashMap;

use bookinfo_core::CallContext;
use tower::{Layer, ServiceExt};
use tracing::debug;

use super::decorator::{Endpoint, IntoEndpoint, LabeledLayer};
use super::operation::{parse_operations, Call, ConfigError, OperationError, OperationId};

// ---------------------------------------------------------------------------
// EndpointSet
// ---------------------------------------------------------------------------

/// Maps each operation of one RPC service to its current callable unit.
///
/// Built and decorated once at startup, then shared read-only (behind an
/// `Arc`) while serving. Decoration is by substitution: every `wrap_*` call
/// replaces the stored unit with a new one closing over the old, so the most
/// recently applied decorator is outermost and runs first.
pub struct EndpointSet<Op, Req, Resp> {
    service: &'static str,
    units: HashMap<Op, Endpoint<Req, Resp>>,
}

impl<Op, Req, Resp> EndpointSet<Op, Req, Resp>
where
    Op: OperationId,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Create an empty set for the named service (e.g. `"comments"`).
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            units: HashMap::new(),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &'static str {
        self.service
    }

    /// Bind a callable unit to an operation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateOperation` if `op` is already bound.
    pub fn register(
        &mut self,
        op: Op,
        unit: impl IntoEndpoint<Req, Resp>,
    ) -> Result<(), ConfigError> {
        if self.units.contains_key(&op) {
            return Err(ConfigError::DuplicateOperation { name: op.name() });
        }
        self.units.insert(op, unit.into_endpoint());
        Ok(())
    }

    /// Apply `layer` to every registered operation not listed in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownExclusion` if an excluded operation is not
    /// registered. Nothing is wrapped in that case.
    pub fn wrap_all_except<L>(&mut self, layer: L, excluded: &[Op]) -> Result<(), ConfigError>
    where
        L: Layer<Endpoint<Req, Resp>>,
        L::Service: IntoEndpoint<Req, Resp>,
    {
        for op in self.included(excluded)? {
            self.replace(op, |inner| layer.layer(inner).into_endpoint());
        }
        Ok(())
    }

    /// Like [`wrap_all_except`](Self::wrap_all_except), but the layer also
    /// receives each operation's name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownExclusion` if an excluded operation is not
    /// registered. Nothing is wrapped in that case.
    pub fn wrap_all_labeled_except<L>(
        &mut self,
        layer: L,
        excluded: &[Op],
    ) -> Result<(), ConfigError>
    where
        L: LabeledLayer<Endpoint<Req, Resp>>,
        L::Service: IntoEndpoint<Req, Resp>,
    {
        for op in self.included(excluded)? {
            self.replace(op, |inner| layer.layer(op.name(), inner).into_endpoint());
        }
        Ok(())
    }

    /// [`wrap_all_except`](Self::wrap_all_except) with exclusions given by name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownExclusion` for a name that is not an
    /// operation of this service or is not registered.
    pub fn wrap_all_except_named<L>(&mut self, layer: L, excluded: &[&str]) -> Result<(), ConfigError>
    where
        L: Layer<Endpoint<Req, Resp>>,
        L::Service: IntoEndpoint<Req, Resp>,
    {
        let excluded = parse_operations::<Op, _>(excluded)?;
        self.wrap_all_except(layer, &excluded)
    }

    /// [`wrap_all_labeled_except`](Self::wrap_all_labeled_except) with
    /// exclusions given by name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownExclusion` for a name that is not an
    /// operation of this service or is not registered.
    pub fn wrap_all_labeled_except_named<L>(
        &mut self,
        layer: L,
        excluded: &[&str],
    ) -> Result<(), ConfigError>
    where
        L: LabeledLayer<Endpoint<Req, Resp>>,
        L::Service: IntoEndpoint<Req, Resp>,
    {
        let excluded = parse_operations::<Op, _>(excluded)?;
        self.wrap_all_labeled_except(layer, &excluded)
    }

    /// Apply `layer` to exactly one operation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownOperation` if `op` is not registered.
    pub fn wrap_one<L>(&mut self, op: Op, layer: L) -> Result<(), ConfigError>
    where
        L: Layer<Endpoint<Req, Resp>>,
        L::Service: IntoEndpoint<Req, Resp>,
    {
        if !self.units.contains_key(&op) {
            return Err(ConfigError::UnknownOperation {
                name: op.name().to_string(),
            });
        }
        self.replace(op, |inner| layer.layer(inner).into_endpoint());
        Ok(())
    }

    /// Dispatch a call to the current unit for `op`.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::UnknownOperation` if `op` is not registered,
    /// otherwise whatever the unit returns.
    pub async fn invoke(&self, op: Op, ctx: CallContext, request: Req) -> Result<Resp, OperationError> {
        let unit = self
            .units
            .get(&op)
            .cloned()
            .ok_or_else(|| OperationError::UnknownOperation {
                name: op.name().to_string(),
            })?;
        unit.oneshot(Call::new(ctx, request)).await
    }

    /// Registered operations in declaration order.
    #[must_use]
    pub fn operations(&self) -> Vec<Op> {
        Op::ALL
            .iter()
            .copied()
            .filter(|op| self.units.contains_key(op))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, op: Op) -> bool {
        self.units.contains_key(&op)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Registered operations minus `excluded`, validating every exclusion
    /// before anything is mutated.
    fn included(&self, excluded: &[Op]) -> Result<Vec<Op>, ConfigError> {
        if let Some(missing) = excluded.iter().find(|op| !self.units.contains_key(op)) {
            return Err(ConfigError::UnknownExclusion {
                name: missing.name().to_string(),
            });
        }
        Ok(self
            .operations()
            .into_iter()
            .filter(|op| !excluded.contains(op))
            .collect())
    }

    fn replace(&mut self, op: Op, wrap: impl FnOnce(Endpoint<Req, Resp>) -> Endpoint<Req, Resp>) {
        if let Some(unit) = self.units.get_mut(&op) {
            *unit = wrap(unit.clone());
            debug!(service = self.service, operation = op.name(), "endpoint wrapped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
