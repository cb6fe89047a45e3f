//! Server-advertised batch limits, fetched once per client and enforced
//! locally before batch operations are sent.
//!
//! The gate has two states: uninitialized and populated. The first caller
//! fetches `pre-flight-checks`; concurrent callers wait on the same fetch.
//! A failed fetch leaves the gate uninitialized so the next call retries.
//! Once populated, limits are never refreshed for the lifetime of the client.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{ChromaError, Result};
use crate::metadata::json_kind;
use crate::transport::{Request, Transport};

pub const PREFLIGHT_PATH: &str = "pre-flight-checks";

const MAX_BATCH_SIZE: &str = "max_batch_size";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Collection,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Collection => "collection",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Read,
    Query,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Query => "query",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// Key of one limit entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceOperation {
    pub resource: Resource,
    pub operation: OperationKind,
}

impl ResourceOperation {
    pub const fn new(resource: Resource, operation: OperationKind) -> Self {
        Self {
            resource,
            operation,
        }
    }

    pub const fn collection(operation: OperationKind) -> Self {
        Self::new(Resource::Collection, operation)
    }
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource, self.operation)
    }
}

/// Cached ceilings keyed by resource/operation. A missing entry means the
/// pair is unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreflightLimits {
    entries: HashMap<ResourceOperation, usize>,
}

impl PreflightLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `pre-flight-checks` response. `max_batch_size` applies to every
    /// collection operation; a response without it yields no limits.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ChromaError::decode(
                PREFLIGHT_PATH,
                format!("expected an object, found {}", json_kind(value)),
            )
        })?;

        let mut limits = Self::new();
        if let Some(raw) = object.get(MAX_BATCH_SIZE) {
            // Some servers encode the limit as a float; the fraction is dropped.
            let max = raw
                .as_u64()
                .or_else(|| {
                    raw.as_f64()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    ChromaError::decode(
                        MAX_BATCH_SIZE,
                        format!("expected a non-negative number, found {raw}"),
                    )
                })?;
            for operation in [
                OperationKind::Create,
                OperationKind::Read,
                OperationKind::Query,
                OperationKind::Update,
                OperationKind::Delete,
            ] {
                limits.set(ResourceOperation::collection(operation), max);
            }
        }
        Ok(limits)
    }

    pub fn set(&mut self, key: ResourceOperation, limit: usize) -> &mut Self {
        self.entries.insert(key, limit);
        self
    }

    pub fn get(&self, key: ResourceOperation) -> Option<usize> {
        self.entries.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject `observed` when it reaches the cached limit (`observed >= limit`).
    pub fn satisfies(&self, key: ResourceOperation, observed: usize) -> Result<()> {
        let Some(limit) = self.get(key) else {
            return Ok(());
        };
        if observed >= limit {
            tracing::warn!(
                target: "chroma::preflight",
                resource = %key.resource,
                operation = %key.operation,
                limit,
                observed,
                "batch rejected by preflight limit"
            );
            return Err(ChromaError::LimitExceeded {
                resource: key.resource,
                operation: key.operation,
                limit,
                observed,
            });
        }
        Ok(())
    }
}

/// Per-client, populate-once cache of [`PreflightLimits`].
#[derive(Debug, Default)]
pub struct PreflightGate {
    limits: OnceCell<PreflightLimits>,
}

impl PreflightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate that starts out populated and never fetches.
    pub fn with_limits(limits: PreflightLimits) -> Self {
        Self {
            limits: OnceCell::new_with(Some(limits)),
        }
    }

    /// Return the cached limits, fetching them through `transport` on first use.
    pub async fn ensure<T>(&self, transport: &T) -> Result<&PreflightLimits>
    where
        T: Transport + ?Sized,
    {
        self.limits
            .get_or_try_init(|| async move {
                tracing::debug!(target: "chroma::preflight", "fetching preflight limits");
                let body = transport.send(Request::get(PREFLIGHT_PATH)).await?;
                let raw: Value = serde_json::from_slice(&body)?;
                let limits = PreflightLimits::from_json_value(&raw)?;
                tracing::info!(
                    target: "chroma::preflight",
                    entries = limits.len(),
                    "preflight limits populated"
                );
                Ok::<_, ChromaError>(limits)
            })
            .await
    }

    /// Populate if needed, then check `observed` against the limit for `key`.
    pub async fn satisfies<T>(
        &self,
        transport: &T,
        key: ResourceOperation,
        observed: usize,
    ) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        self.ensure(transport).await?.satisfies(key, observed)
    }

    pub fn is_populated(&self) -> bool {
        self.limits.initialized()
    }

    pub fn limits(&self) -> Option<&PreflightLimits> {
        self.limits.get()
    }
}
