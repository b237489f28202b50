//! Request and operation observers
//!
//! The pipeline reports what it does through the [`Hooks`] trait:
//! - operation start/end around a semantic call (`Pipeline::operation`)
//! - request start/end around every settled request
//! - one retry notification per repeated attempt
//! - one paginate notification per page after the first
//!
//! Hook calls are isolated: a panicking hook is logged and skipped, and the
//! request carries on.

pub mod hooks;

pub use hooks::{
    ChainHooks, HookEvent, Hooks, NoopHooks, OperationInfo, OperationResult, RecordingHooks,
    RequestInfo, RequestResult, TracingHooks,
};

pub(crate) use hooks::isolate;
