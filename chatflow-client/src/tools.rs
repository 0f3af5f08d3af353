//! Client-executed tools.
//!
//! Tools registered on the client run in the host application when the
//! adapter announces `tool-input-available`. Success is recorded as a
//! completed tool result; failure as an errored one, so the model still
//! sees the failure and can react on the next turn.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// A tool executed in the host application.
#[async_trait]
pub trait ClientTool: Send + Sync {
    /// Run the tool with its parsed input.
    ///
    /// The error string becomes the tool result's `errorText`.
    async fn execute(&self, input: Value) -> Result<Value, String>;
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// Adapter turning an async closure into a [`ClientTool`].
pub struct FnTool {
    run: Box<dyn Fn(Value) -> ToolFuture + Send + Sync>,
}

impl FnTool {
    /// Wrap an async function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            run: Box::new(move |input| Box::pin(f(input))),
        }
    }
}

#[async_trait]
impl ClientTool for FnTool {
    async fn execute(&self, input: Value) -> Result<Value, String> {
        (self.run)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_tool_success() {
        let tool = FnTool::new(|input: Value| async move {
            Ok(json!({"echo": input}))
        });
        let out = tool.execute(json!({"x": 1})).await.unwrap();
        assert_eq!(out["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn test_fn_tool_failure() {
        let tool = FnTool::new(|_| async move { Err("nope".to_string()) });
        assert_eq!(tool.execute(json!({})).await.unwrap_err(), "nope");
    }
}
