// callplan-core/src/progress.rs

/// Sends real-time progress updates out of the pipeline to whichever front
/// end subscribes.
///
/// `send` is called from the middle of planning and executor code, so
/// implementations must not block and should swallow delivery failures.
pub trait Stream: Send + Sync {
    fn send(&self, message: &str);
}

/// A sink that discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOp;

impl Stream for NoOp {
    fn send(&self, _message: &str) {}
}
