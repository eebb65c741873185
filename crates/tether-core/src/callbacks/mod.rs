//! User-supplied callbacks the agent calls back into
//!
//! Every callback is an async trait with a blanket implementation for
//! matching closures, and reports failure through `anyhow::Result`.

pub mod hooks;
pub mod permission;
pub mod tool;
pub mod user_input;

pub use hooks::{HookHandler, HookInvocation, HookKind, SessionHooks};
pub use permission::{
    PermissionDecision, PermissionDecisionKind, PermissionHandler, PermissionInvocation,
    PermissionPrecedence, PermissionRequest,
};
pub use tool::{
    ToolBinaryResult, ToolDefinition, ToolHandler, ToolInvocation, ToolOutput, ToolResultObject,
    ToolResultType,
};
pub use user_input::{UserInputHandler, UserInputInvocation, UserInputRequest, UserInputResponse};

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;

/// Run a synchronous callback, turning a panic into an error.
pub(crate) fn run_guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("callback panicked: {}", panic_message(&*panic))))
}

/// Await an asynchronous callback, turning a panic into an error.
pub(crate) async fn run_guarded_async<T>(
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("callback panicked: {}", panic_message(&*panic))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
