use affinity_durable::prelude::*;
use tracing::{info, warn};

use super::processing::{ImageProcessingInput, ImageProcessingWorkflow};
use crate::activities::FindRandomImage;
use crate::config::ImageWorkflowConfig;

/// Logical ID the binary runs the finder under
pub const FINDER_WORKFLOW_ID: &str = "image_finder";

/// Perpetual image discovery loop
///
/// Every run discovers at most one image, starts a processing child for it
/// and continues as new. Discovery and child-start failures are absorbed:
/// the run recycles without work. The loop ends only through cancellation.
pub struct ImageFinderWorkflow {
    config: ImageWorkflowConfig,
}

impl ImageFinderWorkflow {
    pub fn new(config: ImageWorkflowConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Workflow for ImageFinderWorkflow {
    const TYPE: &'static str = "image_finder";
    type Input = ();
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, _input: ()) -> WorkflowResult<Self> {
        let image_address = match ctx
            .execute::<FindRandomImage>((), &self.config.activity_options)
            .await
        {
            Ok(address) => address,
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                warn!(
                    workflow_id = %ctx.workflow_id(),
                    run_id = %ctx.run_id(),
                    error = %e,
                    "image discovery failed, recycling"
                );
                return Ok(WorkflowOutcome::ContinueAsNew(()));
            }
        };

        let child = match ctx
            .start_child_workflow::<ImageProcessingWorkflow>(
                ImageProcessingInput::new(image_address.clone()),
                &self.config.child_options,
            )
            .await
        {
            Ok(child) => child,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    workflow_id = %ctx.workflow_id(),
                    run_id = %ctx.run_id(),
                    image_address = %image_address,
                    error = %e,
                    "processing child could not be started, recycling"
                );
                return Ok(WorkflowOutcome::ContinueAsNew(()));
            }
        };

        info!(
            workflow_id = %ctx.workflow_id(),
            child_workflow_id = %child.workflow_id,
            image_address = %image_address,
            "image handed off for processing"
        );
        Ok(WorkflowOutcome::ContinueAsNew(()))
    }
}
