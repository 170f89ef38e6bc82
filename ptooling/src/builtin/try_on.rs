use std::sync::Arc;

use pcommon::BoxFuture;
use pprovider::{ToolArguments, ToolDefinition};
use serde_json::json;

use crate::{
    Artifact, ImageAttachment, QuotaKind, Tool, ToolError, ToolExecutionContext, ToolFuture,
    ToolGate, ToolOutput, required_string, required_u32,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarmentType {
    UpperBody,
    LowerBody,
    Dress,
}

impl GarmentType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upper_body" | "upper" | "top" => Some(Self::UpperBody),
            "lower_body" | "lower" | "bottom" => Some(Self::LowerBody),
            "dress" | "dresses" => Some(Self::Dress),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpperBody => "upper_body",
            Self::LowerBody => "lower_body",
            Self::Dress => "dresses",
        }
    }
}

pub trait TryOnProvider: Send + Sync {
    fn try_on<'a>(
        &'a self,
        model_image: &'a ImageAttachment,
        cloth_image: &'a ImageAttachment,
        garment: GarmentType,
    ) -> BoxFuture<'a, Result<Vec<u8>, ToolError>>;
}

/// Dresses the person in one attached photo with the garment from another.
pub struct TryOnGarmentTool {
    provider: Arc<dyn TryOnProvider>,
}

impl TryOnGarmentTool {
    pub fn new(provider: Arc<dyn TryOnProvider>) -> Self {
        Self { provider }
    }
}

fn attachment<'a>(
    context: &'a ToolExecutionContext,
    index: u32,
    key: &str,
) -> Result<&'a ImageAttachment, ToolError> {
    usize::try_from(index)
        .ok()
        .and_then(|index| context.attachments.get(index))
        .ok_or_else(|| {
            ToolError::invalid_arguments(format!(
                "'{key}' refers to image {index}, but only {} image(s) were attached",
                context.attachments.len()
            ))
        })
}

impl Tool for TryOnGarmentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "try_on_garment".to_string(),
            description: "Show how a garment from one attached photo looks on the person in another attached photo."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model_image_index": {"type": "integer", "minimum": 0},
                    "cloth_image_index": {"type": "integer", "minimum": 0},
                    "garment_type": {"type": "string", "enum": ["upper_body", "lower_body", "dresses"]}
                },
                "required": ["model_image_index", "cloth_image_index", "garment_type"]
            }),
        }
    }

    fn gate(&self) -> ToolGate {
        ToolGate::Metered(QuotaKind::Image)
    }

    fn progress_label(&self) -> String {
        "Trying it on...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let model_index = required_u32(arguments, "model_image_index")?;
            let cloth_index = required_u32(arguments, "cloth_image_index")?;
            if model_index == cloth_index {
                return Err(ToolError::invalid_arguments(
                    "model and garment must be different images",
                ));
            }

            let garment_name = required_string(arguments, "garment_type")?;
            let garment = GarmentType::parse(&garment_name).ok_or_else(|| {
                ToolError::invalid_arguments(format!("unknown garment_type '{garment_name}'"))
            })?;

            let model_image = attachment(context, model_index, "model_image_index")?;
            let cloth_image = attachment(context, cloth_index, "cloth_image_index")?;
            let image = self
                .provider
                .try_on(model_image, cloth_image, garment)
                .await?;

            Ok(ToolOutput::new(json!({
                "status": "completed",
                "garment_type": garment.as_str(),
                "images": [{"ref": "image-1"}],
            }))
            .with_artifact(Artifact::Images(vec![image])))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolErrorKind;

    struct EchoTryOn;

    impl TryOnProvider for EchoTryOn {
        fn try_on<'a>(
            &'a self,
            model_image: &'a ImageAttachment,
            cloth_image: &'a ImageAttachment,
            _garment: GarmentType,
        ) -> BoxFuture<'a, Result<Vec<u8>, ToolError>> {
            Box::pin(async move {
                let mut combined = model_image.bytes.clone();
                combined.extend_from_slice(&cloth_image.bytes);
                Ok(combined)
            })
        }
    }

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().expect("object literal")
    }

    fn context_with_two_photos() -> ToolExecutionContext {
        ToolExecutionContext::new("u1").with_attachments(vec![
            ImageAttachment::new("image/jpeg", vec![1]),
            ImageAttachment::new("image/jpeg", vec![2]),
        ])
    }

    #[tokio::test]
    async fn uses_the_attached_images_by_index() {
        let tool = TryOnGarmentTool::new(Arc::new(EchoTryOn));

        let output = tool
            .invoke(
                &args(json!({"model_image_index": 1, "cloth_image_index": 0, "garment_type": "top"})),
                &context_with_two_photos(),
            )
            .await
            .expect("try-on should succeed");

        assert_eq!(output.artifact, Some(Artifact::Images(vec![vec![2, 1]])));
        assert_eq!(output.payload["garment_type"], "upper_body");
    }

    #[tokio::test]
    async fn missing_attachment_is_an_argument_error() {
        let tool = TryOnGarmentTool::new(Arc::new(EchoTryOn));

        let error = tool
            .invoke(
                &args(json!({"model_image_index": 0, "cloth_image_index": 5, "garment_type": "dress"})),
                &context_with_two_photos(),
            )
            .await
            .expect_err("index 5 does not exist");

        assert_eq!(error.kind, ToolErrorKind::InvalidArguments);
    }
}
