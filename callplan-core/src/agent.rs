// callplan-core/src/agent.rs
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::HandlerError;
use crate::handler::{ProcessingResult, RequestHandler, RequestHandlerConfig};
use crate::progress;

/// High-level facade for processing user requests. Wraps a
/// [`RequestHandler`] behind a simplified interface for interpreting and
/// executing user queries.
pub struct Agent {
    request_handler: RequestHandler,
}

impl Agent {
    pub fn new(config: RequestHandlerConfig) -> Result<Self, HandlerError> {
        Ok(Self {
            request_handler: RequestHandler::new(config)?,
        })
    }

    /// Interprets the user's message, executes the appropriate actions, and
    /// returns the processing result.
    pub async fn process(
        &self,
        cancel: CancellationToken,
        message: &str,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<ProcessingResult, HandlerError> {
        self.request_handler
            .process_user_request(cancel, message, progress)
            .await
    }
}
