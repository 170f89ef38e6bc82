use std::sync::Arc;

use pcommon::BoxFuture;
use pprovider::{ToolArguments, ToolDefinition};
use serde_json::json;

use crate::{
    Artifact, QuotaKind, Tool, ToolError, ToolExecutionContext, ToolFuture, ToolGate, ToolOutput,
    optional_u32, required_string,
};

const DEFAULT_DURATION_SECONDS: u32 = 5;
const MAX_DURATION_SECONDS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    /// Where the transport can fetch the clip from.
    pub reference: String,
}

pub trait VideoGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        duration_seconds: u32,
    ) -> BoxFuture<'a, Result<GeneratedVideo, ToolError>>;
}

pub struct GenerateVideoTool {
    generator: Arc<dyn VideoGenerator>,
}

impl GenerateVideoTool {
    pub fn new(generator: Arc<dyn VideoGenerator>) -> Self {
        Self { generator }
    }
}

impl Tool for GenerateVideoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "generate_video".to_string(),
            description: "Generate a short video clip from a text description.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "duration_seconds": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_DURATION_SECONDS
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn gate(&self) -> ToolGate {
        ToolGate::Metered(QuotaKind::Video)
    }

    fn progress_label(&self) -> String {
        "Rendering your video, this can take a minute...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let prompt = required_string(arguments, "prompt")?;
            let duration = optional_u32(arguments, "duration_seconds")?
                .unwrap_or(DEFAULT_DURATION_SECONDS)
                .clamp(1, MAX_DURATION_SECONDS);

            let video = self.generator.generate(&prompt, duration).await?;

            Ok(ToolOutput::new(json!({
                "status": "completed",
                "video": {"ref": "video-1", "duration_seconds": duration},
            }))
            .with_artifact(Artifact::Video {
                reference: video.reference,
            }))
        })
    }
}
