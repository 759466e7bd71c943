//! Handler registration and event dispatch.
//!
//! Registration order is significant: handlers for an event run in the order
//! they were registered, exact-type registrations before wildcard ones, and
//! the first registered middleware is the outermost wrapper. The registration
//! table is written during startup and read-only afterwards, so a shared
//! `Arc<Dispatcher>` can serve concurrent dispatches without locking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, event_types};
use crate::filters::Filter;

/// What a handler produced. Handlers return JSON so outcomes can be reported
/// uniformly; handlers with nothing to say return `Value::Null`.
pub type HandlerResult = anyhow::Result<Value>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered event handler.
pub type Handler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<HandlerResult> + Send + Sync>;

/// A failed handler invocation, as reported in the dispatch results.
#[derive(Debug, Error)]
#[error("handler '{handler}' failed for event '{event_type}': {source}")]
pub struct HandlerError {
    pub handler: String,
    pub event_type: String,
    #[source]
    pub source: anyhow::Error,
}

/// Wrapper invoked around every matched handler.
///
/// A middleware must call `next.run(event)` to continue the chain; declining
/// to do so short-circuits the handler.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, event: Arc<Event>, next: Next<'_>) -> HandlerResult;
}

/// The remainder of the middleware chain plus the final handler.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    handler: &'a Handler,
}

impl Next<'_> {
    pub async fn run(self, event: Arc<Event>) -> HandlerResult {
        match self.chain.split_first() {
            Some((outer, rest)) => {
                let next = Next {
                    chain: rest,
                    handler: self.handler,
                };
                outer.handle(event, next).await
            }
            None => (self.handler)(event).await,
        }
    }
}

struct Registration {
    name: String,
    filter: Option<Box<dyn Filter>>,
    handler: Handler,
}

/// The registration + routing + middleware-chaining engine.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Vec<Registration>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type, with an optional filter.
    ///
    /// `name` identifies the handler in logs and error outcomes. Use
    /// [`event_types::WILDCARD`] to receive every event type.
    pub fn on<F, Fut>(
        &mut self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        filter: Option<Box<dyn Filter>>,
        handler: F,
    ) where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.register(event_type, name, filter, handler);
    }

    /// Low-level registration taking an already-boxed handler.
    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        filter: Option<Box<dyn Filter>>,
        handler: Handler,
    ) {
        let event_type = event_type.into();
        let name = name.into();
        tracing::debug!(
            "registered handler '{name}' for event: {event_type}{}",
            if filter.is_some() { " (filtered)" } else { "" }
        );
        self.handlers.entry(event_type).or_default().push(Registration {
            name,
            filter,
            handler,
        });
    }

    /// Append a middleware to the chain. The first registered middleware is
    /// the outermost wrapper around every matched handler.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Event types with at least one registration.
    pub fn registered_events(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Drop every registration. Test isolation only.
    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
        tracing::info!("all handlers cleared");
    }

    /// Parse a raw webhook payload and invoke every matching handler.
    ///
    /// Returns one outcome per invoked handler, in invocation order. A failing
    /// handler is logged and recorded but never stops its siblings. An event
    /// type with no registrations is not an error: it yields an empty vec.
    pub async fn dispatch(&self, payload: &Value) -> Vec<Result<Value, HandlerError>> {
        let event = Arc::new(Event::from_value(payload));

        let mut candidates: Vec<&Registration> = Vec::new();
        if let Some(regs) = self.handlers.get(&event.event_type) {
            candidates.extend(regs.iter());
        }
        if event.event_type != event_types::WILDCARD {
            if let Some(regs) = self.handlers.get(event_types::WILDCARD) {
                candidates.extend(regs.iter());
            }
        }

        if candidates.is_empty() {
            tracing::warn!("no handlers registered for event: {}", event.event_type);
            return Vec::new();
        }

        let mut results = Vec::with_capacity(candidates.len());
        for registration in candidates {
            if let Some(filter) = &registration.filter {
                if !filter.check(&event).await {
                    tracing::debug!(
                        "filter did not pass for handler '{}' on event {}",
                        registration.name,
                        event.event_type
                    );
                    continue;
                }
            }

            let chain = Next {
                chain: &self.middlewares,
                handler: &registration.handler,
            };
            match chain.run(event.clone()).await {
                Ok(value) => results.push(Ok(value)),
                Err(source) => {
                    tracing::error!(
                        "error processing event {} with handler '{}': {source:#}",
                        event.event_type,
                        registration.name
                    );
                    results.push(Err(HandlerError {
                        handler: registration.name.clone(),
                        event_type: event.event_type.clone(),
                        source,
                    }));
                }
            }
        }

        results
    }
}
