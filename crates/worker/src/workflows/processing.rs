use affinity_durable::prelude::*;
use affinity_durable::RecreateToken;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::activities::{CalcChecksum, DownloadImage};
use crate::config::ImageWorkflowConfig;

/// Input of a processing run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageProcessingInput {
    /// Address of the image to process
    pub image_address: String,

    /// Session chain to resume; empty starts a fresh session
    #[serde(default)]
    pub recreate_token: RecreateToken,
}

impl ImageProcessingInput {
    /// Input for a fresh chain
    pub fn new(image_address: impl Into<String>) -> Self {
        Self {
            image_address: image_address.into(),
            recreate_token: RecreateToken::empty(),
        }
    }

    /// Resume the chain captured by `token`
    pub fn with_recreate_token(mut self, token: RecreateToken) -> Self {
        self.recreate_token = token;
        self
    }
}

/// Result of a successful processing run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageProcessingOutput {
    pub image_address: String,
    pub checksum: String,
}

/// Download and checksum one image on a single worker
///
/// The session is released on every exit path. A failed chain fails the
/// run, unless `resume_on_failure` is set, in which case the run continues as
/// new with the session's recreate token.
pub struct ImageProcessingWorkflow {
    config: ImageWorkflowConfig,
}

impl ImageProcessingWorkflow {
    pub fn new(config: ImageWorkflowConfig) -> Self {
        Self { config }
    }

    async fn process(
        &self,
        ctx: &WorkflowContext,
        session: &mut Session,
        image_address: &str,
    ) -> Result<String, ActivityError> {
        let options = &self.config.activity_options;

        let path = ctx
            .execute_in::<DownloadImage>(session, image_address.to_string(), options)
            .await?;
        ctx.execute_in::<CalcChecksum>(session, path, options).await
    }
}

#[async_trait]
impl Workflow for ImageProcessingWorkflow {
    const TYPE: &'static str = "image_processing";
    type Input = ImageProcessingInput;
    type Output = ImageProcessingOutput;

    async fn run(&self, ctx: &WorkflowContext, input: ImageProcessingInput) -> WorkflowResult<Self> {
        let options = &self.config.session_options;
        let mut session = if input.recreate_token.is_empty() {
            ctx.create_session(options).await?
        } else {
            ctx.recreate_session(&input.recreate_token, options).await?
        };

        let result = self.process(ctx, &mut session, &input.image_address).await;
        let token = session.recreate_token().clone();
        ctx.complete_session(session).await;

        match result {
            Ok(checksum) => {
                info!(
                    workflow_id = %ctx.workflow_id(),
                    image_address = %input.image_address,
                    checksum = %checksum,
                    "image processing workflow completed"
                );
                Ok(WorkflowOutcome::Completed(ImageProcessingOutput {
                    image_address: input.image_address,
                    checksum,
                }))
            }
            Err(e) if self.config.resume_on_failure && !e.is_cancelled() => {
                warn!(
                    workflow_id = %ctx.workflow_id(),
                    error = %e,
                    "image processing failed, resuming session chain"
                );
                Ok(WorkflowOutcome::ContinueAsNew(
                    ImageProcessingInput::new(input.image_address).with_recreate_token(token),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}
