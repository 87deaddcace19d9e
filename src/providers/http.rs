use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::ProviderError;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for one external API, bounded by a request timeout and guarded
/// by a circuit breaker so a dead provider is skipped without waiting.
#[derive(Clone)]
pub struct GuardedClient {
    name: String,
    client: Client,
    circuit_breaker: Breaker,
}

impl GuardedClient {
    /// Creates a client that opens after 3 consecutive failures for 60-120s.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self::with_circuit_breaker(name, timeout, 3, 60)
    }

    pub fn with_circuit_breaker(
        name: impl Into<String>,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            name: name.into(),
            client,
            circuit_breaker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Sends `request` and decodes a JSON body. Non-2xx and undecodable bodies are errors.
    pub async fn send_json<T>(&self, request: RequestBuilder) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let provider = self.name.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ProviderError::Status {
                        provider,
                        status: status.as_u16(),
                    });
                }

                response
                    .json::<T>()
                    .await
                    .map_err(|e| ProviderError::Malformed {
                        provider,
                        message: e.to_string(),
                    })
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(self.name.clone())),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
