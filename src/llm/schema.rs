//! Function schema adapters
//!
//! Pure renderings of a [`FunctionDescriptor`] into each provider's tool
//! format. The parameter schema is passed through verbatim.

use crate::registry::FunctionDescriptor;
use serde_json::{json, Value};

/// OpenAI-style `tools` entry
pub fn to_openai_function(function: &FunctionDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": function.qualified_name(),
            "description": function.description,
            "parameters": function.parameter_schema,
        }
    })
}

/// Anthropic-style `tools` entry
pub fn to_anthropic_tool(function: &FunctionDescriptor) -> Value {
    json!({
        "name": function.qualified_name(),
        "description": function.description,
        "input_schema": function.parameter_schema,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionClass;

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor::new(
            "docs",
            "search",
            Some("Search library docs".to_string()),
            json!({
                "type": "object",
                "properties": {"library": {"type": "string"}, "topic": {"type": "string"}},
                "required": ["library"]
            }),
            FunctionClass::Search,
            true,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_openai_function_passes_schema_verbatim() {
        let function = descriptor();
        let rendered = to_openai_function(&function);
        assert_eq!(rendered["type"], "function");
        assert_eq!(rendered["function"]["name"], "docs__search");
        assert_eq!(rendered["function"]["description"], "Search library docs");
        assert_eq!(rendered["function"]["parameters"], function.parameter_schema);
    }

    #[test]
    fn test_anthropic_tool_wraps_schema() {
        let function = descriptor();
        let rendered = to_anthropic_tool(&function);
        assert_eq!(rendered["name"], "docs__search");
        assert_eq!(rendered["input_schema"], function.parameter_schema);
        assert_eq!(rendered.as_object().unwrap().len(), 3);
    }
}
