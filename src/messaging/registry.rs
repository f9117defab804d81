//! Resource handler registry keyed by (endpoint, path) patterns.
//!
//! A pattern is either a literal string or the wildcard `*`.  Specificity
//! is resolved at lookup time by trying four candidate keys in order:
//!
//! ```text
//!   (endpoint, path) → (*, path) → (endpoint, *) → (*, *) → default
//! ```
//!
//! Among entries with the same key the last registered wins.  The table is
//! small (bounded by `max_resource_number`), so a linear scan over a `Vec`
//! behind one reader-writer lock is enough.

use core::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use super::message::{RequestMessage, ResponseMessage};
use crate::error::{Error, Result};

/// One side of a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    Any,
    Exact(String),
}

impl Pattern {
    pub const WILDCARD: &'static str = "*";

    /// `"*"` and the empty string both mean "any".
    pub fn parse(s: &str) -> Self {
        if s.is_empty() || s == Self::WILDCARD {
            Self::Any
        } else {
            Self::Exact(s.to_owned())
        }
    }

    fn is_literal(&self, s: &str) -> bool {
        matches!(self, Self::Exact(lit) if lit == s)
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(Self::WILDCARD),
            Self::Exact(s) => f.write_str(s),
        }
    }
}

/// Fills in the response for a routed request.  Leaving the response
/// untouched yields a 404.
///
/// Handlers run on the router poll thread.  Any state a handler needs is
/// captured by the implementing type (or closure).
pub trait ResourceHandler: Send + Sync {
    fn handle(&self, request: &RequestMessage, response: &mut ResponseMessage);
}

impl<F> ResourceHandler for F
where
    F: Fn(&RequestMessage, &mut ResponseMessage) + Send + Sync,
{
    fn handle(&self, request: &RequestMessage, response: &mut ResponseMessage) {
        self(request, response)
    }
}

/// Shared reference to a handler.  Two refs are equal when they point at
/// the same handler instance.
#[derive(Clone)]
pub struct HandlerRef(Arc<dyn ResourceHandler>);

impl HandlerRef {
    pub fn new(handler: impl ResourceHandler + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<dyn ResourceHandler>) -> Self {
        Self(handler)
    }

    pub fn handle(&self, request: &RequestMessage, response: &mut ResponseMessage) {
        self.0.handle(request, response);
    }

    /// Built-in default: leaves the response at 404.
    pub fn not_found() -> Self {
        Self::new(|_: &RequestMessage, _: &mut ResponseMessage| {})
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for HandlerRef {}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerRef({:p})", Arc::as_ptr(&self.0))
    }
}

struct Entry {
    endpoint: Pattern,
    path: Pattern,
    handler: HandlerRef,
}

pub struct HandlerRegistry {
    entries: RwLock<Vec<Entry>>,
    capacity: usize,
    default: RwLock<HandlerRef>,
}

impl HandlerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
            default: RwLock::new(HandlerRef::not_found()),
        }
    }

    /// Register `handler` for the key.  An existing entry with the same
    /// patterns is replaced.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `handler` is `None`.
    /// - `OutOfMemory` if the registry is full.
    pub fn register(
        &self,
        endpoint: &str,
        path: &str,
        handler: impl Into<Option<HandlerRef>>,
    ) -> Result<()> {
        let Some(handler) = handler.into() else {
            return Err(Error::InvalidArgument);
        };
        let endpoint = Pattern::parse(endpoint);
        let path = Pattern::parse(path);

        let mut entries = self.entries.write();
        entries.retain(|e| !(e.endpoint == endpoint && e.path == path));
        if entries.len() >= self.capacity {
            warn!(
                "Registry: full ({}), rejecting ({}, {})",
                self.capacity, endpoint, path
            );
            return Err(Error::OutOfMemory);
        }
        info!("Registry: registered ({}, {})", endpoint, path);
        entries.push(Entry {
            endpoint,
            path,
            handler,
        });
        Ok(())
    }

    /// Remove the entry with exactly these patterns.  Absent is not an
    /// error.
    pub fn unregister(&self, endpoint: &str, path: &str) -> Result<()> {
        let endpoint = Pattern::parse(endpoint);
        let path = Pattern::parse(path);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !(e.endpoint == endpoint && e.path == path));
        if entries.len() != before {
            info!("Registry: unregistered ({}, {})", endpoint, path);
        }
        Ok(())
    }

    /// Remove every entry pointing at `handler`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `handler` is `None`.
    pub fn unregister_all(&self, handler: impl Into<Option<HandlerRef>>) -> Result<()> {
        let Some(handler) = handler.into() else {
            return Err(Error::InvalidArgument);
        };
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.handler != handler);
        let removed = before - entries.len();
        if removed > 0 {
            info!("Registry: unregistered {} entries for {:?}", removed, handler);
        }
        Ok(())
    }

    /// Resolve the handler for a request addressed to `endpoint` at `path`.
    /// Never fails; falls back to the default handler.
    pub fn lookup(&self, endpoint: &str, path: &str) -> HandlerRef {
        let entries = self.entries.read();
        let find = |ep_literal: bool, path_literal: bool| {
            entries.iter().rev().find(|e| {
                let ep_ok = if ep_literal {
                    e.endpoint.is_literal(endpoint)
                } else {
                    e.endpoint == Pattern::Any
                };
                let path_ok = if path_literal {
                    e.path.is_literal(path)
                } else {
                    e.path == Pattern::Any
                };
                ep_ok && path_ok
            })
        };

        let hit = find(true, true)
            .or_else(|| find(false, true))
            .or_else(|| find(true, false))
            .or_else(|| find(false, false));

        match hit {
            Some(entry) => {
                debug!(
                    "Registry: ({}, {}) resolved to ({}, {})",
                    endpoint, path, entry.endpoint, entry.path
                );
                entry.handler.clone()
            }
            None => {
                debug!("Registry: ({}, {}) resolved to default", endpoint, path);
                self.default.read().clone()
            }
        }
    }

    /// Replace the fallback handler used when nothing matches.
    pub fn set_default_handler(&self, handler: HandlerRef) {
        *self.default.write() = handler;
    }

    /// Whether `handler` is the current fallback, i.e. a lookup resolving
    /// to it matched no registered entry.
    pub fn is_default(&self, handler: &HandlerRef) -> bool {
        *self.default.read() == *handler
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
