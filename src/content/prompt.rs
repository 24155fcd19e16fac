/// Prompt rendering
///
/// Scenario prompts are stored as templates with two constructs:
/// `{{field}}` substitutes a user input value, and
/// `{{#if field}}...{{/if}}` keeps its body only when the field is
/// present and non-empty. Unknown placeholders render as empty rather
/// than erroring, since scenario templates evolve separately from the
/// input schemas clients were built against.
use crate::db::models::{Scenario, ToneStyle};
use crate::providers::ChatMessage;
use std::collections::HashMap;

/// Render the message list for one generation
pub fn build_messages(
    scenario: &Scenario,
    tone: Option<&ToneStyle>,
    inputs: &HashMap<String, String>,
) -> Vec<ChatMessage> {
    // Scenario prompts may reference inputs directly
    let mut system = render_template(&scenario.system_prompt, inputs);
    if let Some(tone) = tone {
        if !tone.prompt_modifier.trim().is_empty() {
            system.push_str("\n\n");
            system.push_str(&tone.prompt_modifier);
        }
    }
    system.push_str(&format!(
        "\n\nKeep the copy under {} characters.",
        scenario.max_length
    ));

    vec![
        ChatMessage::system(system),
        ChatMessage::user(user_prompt_body(inputs)),
    ]
}

/// Default user-prompt body: one labelled line per provided input
fn user_prompt_body(inputs: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = inputs.keys().collect();
    keys.sort();

    let mut body = String::from("Write marketing copy based on:\n");
    for key in keys {
        if let Some(value) = inputs.get(key) {
            if !value.trim().is_empty() {
                body.push_str(&format!("- {}: {}\n", key, value.trim()));
            }
        }
    }
    body
}

/// Expand `{{#if field}}` blocks and `{{field}}` placeholders
pub fn render_template(template: &str, inputs: &HashMap<String, String>) -> String {
    let expanded = expand_conditionals(template, inputs);
    substitute_placeholders(&expanded, inputs)
}

fn expand_conditionals(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open_at) = rest.find("{{#if ") {
        result.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + "{{#if ".len()..];

        let Some(name_end) = after_open.find("}}") else {
            // Malformed opener, emit the rest verbatim
            result.push_str(&rest[open_at..]);
            return result;
        };
        let field = after_open[..name_end].trim();
        let body_start = &after_open[name_end + 2..];

        let Some(close_at) = body_start.find("{{/if}}") else {
            result.push_str(&rest[open_at..]);
            return result;
        };

        let truthy = inputs
            .get(field)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if truthy {
            // Bodies may nest substitutions but not further conditionals
            result.push_str(&body_start[..close_at]);
        }

        rest = &body_start[close_at + "{{/if}}".len()..];
    }

    result.push_str(rest);
    result
}

fn substitute_placeholders(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open_at) = rest.find("{{") {
        result.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + 2..];

        let Some(close_at) = after_open.find("}}") else {
            result.push_str(&rest[open_at..]);
            return result;
        };

        let name = after_open[..close_at].trim();
        if let Some(value) = inputs.get(name) {
            result.push_str(value.trim());
        }
        // Unknown placeholders are stripped

        rest = &after_open[close_at + 2..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_placeholders() {
        let rendered = render_template(
            "Product: {{product}}, audience: {{audience}}",
            &inputs(&[("product", "tea"), ("audience", "students")]),
        );
        assert_eq!(rendered, "Product: tea, audience: students");
    }

    #[test]
    fn test_unknown_placeholder_is_stripped() {
        let rendered = render_template("Selling {{product}} for {{price}}", &inputs(&[("product", "tea")]));
        assert_eq!(rendered, "Selling tea for ");
    }

    #[test]
    fn test_conditional_kept_when_field_present() {
        let rendered = render_template(
            "Copy.{{#if slogan}} Slogan: {{slogan}}.{{/if}}",
            &inputs(&[("slogan", "drink up")]),
        );
        assert_eq!(rendered, "Copy. Slogan: drink up.");
    }

    #[test]
    fn test_conditional_dropped_when_field_missing_or_blank() {
        let template = "Copy.{{#if slogan}} Slogan: {{slogan}}.{{/if}}";
        assert_eq!(render_template(template, &inputs(&[])), "Copy.");
        assert_eq!(
            render_template(template, &inputs(&[("slogan", "  ")])),
            "Copy."
        );
    }

    #[test]
    fn test_build_messages_appends_tone_and_length() {
        let scenario = Scenario {
            id: "s1".to_string(),
            slug: "product-intro".to_string(),
            name: "Product intro".to_string(),
            system_prompt: "You write product copy.".to_string(),
            input_schema: "{}".to_string(),
            default_tone: "lively".to_string(),
            max_length: 300,
            created_at: Utc::now(),
        };
        let tone = ToneStyle {
            id: "t1".to_string(),
            slug: "lively".to_string(),
            name: "Lively".to_string(),
            prompt_modifier: "Use a lively voice.".to_string(),
        };

        let messages = build_messages(&scenario, Some(&tone), &inputs(&[("product", "tea")]));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("You write product copy."));
        assert!(messages[0].content.contains("Use a lively voice."));
        assert!(messages[0].content.contains("300"));
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("product: tea"));
    }
}
