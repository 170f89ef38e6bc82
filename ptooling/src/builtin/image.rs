use std::sync::Arc;

use pcommon::BoxFuture;
use pprovider::{ToolArguments, ToolDefinition};
use serde_json::json;

use crate::{
    Artifact, QuotaKind, Tool, ToolError, ToolExecutionContext, ToolFuture, ToolGate, ToolOutput,
    optional_u32, required_string,
};

pub const MAX_IMAGES_PER_CALL: u32 = 4;

pub trait ImageGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<Vec<Vec<u8>>, ToolError>>;
}

pub struct GenerateImageTool {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerateImageTool {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

impl Tool for GenerateImageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "generate_image".to_string(),
            description: "Generate one or more images from a text description.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "What the image should show"},
                    "count": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_IMAGES_PER_CALL,
                        "description": "How many images to generate"
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn gate(&self) -> ToolGate {
        ToolGate::Metered(QuotaKind::Image)
    }

    fn units_argument(&self) -> Option<&'static str> {
        Some("count")
    }

    fn progress_label(&self) -> String {
        "Drawing your image...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let prompt = required_string(arguments, "prompt")?;
            let count = optional_u32(arguments, "count")?.unwrap_or(1);
            if !(1..=MAX_IMAGES_PER_CALL).contains(&count) {
                return Err(ToolError::invalid_arguments(format!(
                    "count must be between 1 and {MAX_IMAGES_PER_CALL}"
                )));
            }

            let images = self.generator.generate(&prompt, count).await?;
            if images.is_empty() {
                return Err(ToolError::execution("image generator returned no images"));
            }

            let references = (1..=images.len())
                .map(|index| json!({"ref": format!("image-{index}")}))
                .collect::<Vec<_>>();

            Ok(ToolOutput::new(json!({
                "status": "completed",
                "images": references,
            }))
            .with_artifact(Artifact::Images(images)))
        })
    }
}
