//! Ordered fallback strategies for write operations.
//!
//! A [`FallbackChain`] holds named strategies that target the same logical
//! outcome (for example multipart, then JSON with a base64 image). They run
//! in order until one succeeds or one fails with an error no later strategy
//! could fix. Every strategy's final [`AttemptState`] is reported.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    NotTried,
    Failed(String),
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: &'static str,
    pub state: AttemptState,
}

struct Strategy<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a>,
}

pub struct FallbackChain<'a, T> {
    operation: &'static str,
    strategies: Vec<Strategy<'a, T>>,
}

/// Final result plus the per-strategy record.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub result: Result<T>,
    pub attempts: Vec<Attempt>,
}

impl<T> FallbackOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }

    /// Name of the strategy that succeeded, if any.
    pub fn succeeded_with(&self) -> Option<&'static str> {
        self.attempts
            .iter()
            .find(|a| a.state == AttemptState::Succeeded)
            .map(|a| a.strategy)
    }
}

impl<'a, T: Send + 'a> FallbackChain<'a, T> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy. Strategies are lazy: nothing runs until [`run`].
    ///
    /// [`run`]: FallbackChain::run
    pub fn then<F, Fut>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        self.strategies.push(Strategy {
            name,
            run: Box::new(move || strategy().boxed()),
        });
        self
    }

    pub async fn run(self) -> FallbackOutcome<T> {
        let operation = self.operation;
        let mut attempts: Vec<Attempt> = self
            .strategies
            .iter()
            .map(|s| Attempt {
                strategy: s.name,
                state: AttemptState::NotTried,
            })
            .collect();

        let mut last_error = None;
        for (index, strategy) in self.strategies.into_iter().enumerate() {
            debug!(operation, strategy = strategy.name, "Trying strategy");
            match (strategy.run)().await {
                Ok(value) => {
                    attempts[index].state = AttemptState::Succeeded;
                    if index > 0 {
                        debug!(operation, strategy = strategy.name, "Fallback strategy succeeded");
                    }
                    return FallbackOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) => {
                    attempts[index].state = AttemptState::Failed(e.to_string());
                    if e.stops_fallback() {
                        warn!(operation, strategy = strategy.name, error = %e, "Strategy failed, not falling back");
                        return FallbackOutcome {
                            result: Err(e),
                            attempts,
                        };
                    }
                    warn!(operation, strategy = strategy.name, error = %e, "Strategy failed");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ApiError::InvalidInput(format!("no strategy configured for {operation}"))
        });
        FallbackOutcome {
            result: Err(error),
            attempts,
        }
    }
}
