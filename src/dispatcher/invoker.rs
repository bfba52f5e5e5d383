use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::constants::INNER_STATUS_SUCCESS_LOWER;
use crate::constants::INNER_STATUS_SUCCESS_UPPER;
use crate::constants::INVOKE_SUCCESS_STATUS;
use crate::RemoteError;
use crate::Result;

/// Raw reply of a remote invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Transport-level status
    pub status_code: i64,
    /// Serialized JSON body returned by the target
    pub payload: String,
    /// Error tag set by the remote runtime, if any
    pub function_error: Option<String>,
}

impl InvokeResponse {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            status_code: INVOKE_SUCCESS_STATUS,
            payload: payload.into(),
            function_error: None,
        }
    }
}

/// Remote compute endpoint invoked by the dispatcher.
///
/// Implementations own the timeout policy: a call must resolve, successfully
/// or not, within a bounded time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<InvokeResponse>;
}

#[async_trait]
impl<T> RemoteInvoker for Arc<T>
where
    T: RemoteInvoker + ?Sized,
{
    async fn invoke(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<InvokeResponse> {
        (**self).invoke(target, payload).await
    }
}

/// Bounds every call of the wrapped invoker
#[derive(Debug, Clone)]
pub struct TimeoutInvoker<I> {
    inner: I,
    timeout: Duration,
}

impl<I: RemoteInvoker> TimeoutInvoker<I> {
    pub fn new(
        inner: I,
        timeout: Duration,
    ) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<I: RemoteInvoker> RemoteInvoker for TimeoutInvoker<I> {
    async fn invoke(
        &self,
        target: &str,
        payload: &Value,
    ) -> Result<InvokeResponse> {
        match tokio::time::timeout(self.timeout, self.inner.invoke(target, payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(function = %target, timeout_ms = self.timeout.as_millis() as u64, "invocation timed out");
                Err(RemoteError::Timeout {
                    target: target.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }
}

/// Maps a raw reply to the value handed back to callers.
///
/// - transport status other than 200 fails with that status
/// - a `null` or unparsable body fails with `unknown`
/// - a body without a numeric `statusCode` is returned as is
/// - a `statusCode` outside `[200, 300)` fails with the status, else the
///   embedded `errorMessage`, else the function error
/// - otherwise `body` is parsed as JSON when possible, else returned as a string
pub fn interpret_response(
    target: &str,
    response: &InvokeResponse,
) -> std::result::Result<Value, RemoteError> {
    if response.status_code != INVOKE_SUCCESS_STATUS {
        return Err(RemoteError::TransportStatus {
            target: target.to_string(),
            status: response.status_code,
        });
    }

    let failed = |detail: String| RemoteError::InvocationFailed {
        target: target.to_string(),
        detail,
    };

    let payload: Value = match serde_json::from_str(&response.payload) {
        Ok(Value::Null) | Err(_) => return Err(failed("unknown".to_string())),
        Ok(v) => v,
    };

    let Some(status) = payload.get("statusCode").and_then(Value::as_f64) else {
        return Ok(payload);
    };

    if status < INNER_STATUS_SUCCESS_LOWER as f64 || status >= INNER_STATUS_SUCCESS_UPPER as f64 {
        let detail = if status != 0.0 {
            format_status(status)
        } else if let Some(message) = payload.get("errorMessage").and_then(Value::as_str) {
            message.to_string()
        } else if let Some(function_error) = &response.function_error {
            function_error.clone()
        } else {
            "unknown".to_string()
        };
        return Err(failed(detail));
    }

    Ok(match payload.get("body") {
        Some(Value::String(body)) => {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    })
}

fn format_status(status: f64) -> String {
    if status.fract() == 0.0 {
        format!("{}", status as i64)
    } else {
        status.to_string()
    }
}
