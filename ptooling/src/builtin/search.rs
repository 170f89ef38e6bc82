use std::sync::Arc;

use pcommon::BoxFuture;
use pprovider::{ToolArguments, ToolDefinition};
use serde_json::json;

use crate::{
    Artifact, Tool, ToolError, ToolExecutionContext, ToolFuture, ToolOutput, required_string,
};

pub trait WebSearch: Send + Sync {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, ToolError>>;
}

pub struct SearchWebTool {
    search: Arc<dyn WebSearch>,
}

impl SearchWebTool {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self { search }
    }
}

impl Tool for SearchWebTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_web".to_string(),
            description: "Search the web for current information and summarize the findings."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    fn progress_label(&self) -> String {
        "Searching the web...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let query = required_string(arguments, "query")?;
            let answer = self.search.search(&query).await?;

            Ok(ToolOutput::new(json!({"status": "completed", "answer": answer}))
                .with_artifact(Artifact::SearchAnswer(answer)))
        })
    }
}
