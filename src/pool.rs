//! # Context Pool
//!
//! Free-list of request contexts. A dispatch checks one context out,
//! resets it, and returns it after the response is extracted; the pool
//! never hands the same instance to two concurrent requests because an
//! acquired context is owned by value until released.

use crate::context::Context;
use crate::engine::Shared;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Reusable context storage shared by all requests of one engine
pub struct ContextPool {
    shared: Arc<Shared>,
    idle: Mutex<Vec<Context>>,
    created: AtomicUsize,
}

impl ContextPool {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Check a context out, creating one on a pool miss. The caller owns
    /// it exclusively until `release`.
    pub fn acquire(&self) -> Context {
        let popped = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };
        popped.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            Context::new(self.shared.clone())
        })
    }

    /// Return a context to the free list
    pub fn release(&self, ctx: Context) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(ctx);
    }

    /// Total contexts ever created by this pool
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Contexts currently on the free list
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
