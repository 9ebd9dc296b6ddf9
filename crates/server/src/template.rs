//! Chat template formatting
//!
//! Wraps a raw user prompt into the ChatML conversation layout used by
//! Qwen-style instruct models, with the configured system prompt injected
//! as the first turn.

/// A prompt ready to hand to a [`TextGenerator`](crate::model::TextGenerator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    /// Injected system prompt
    pub system: String,

    /// Raw user prompt, unchanged
    pub user: String,

    /// Full model input, ending with the open assistant turn
    pub rendered: String,
}

/// ChatML template with a fixed system prompt
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    system_prompt: String,
}

impl ChatTemplate {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// Render a single-turn conversation for `prompt`
    pub fn render(&self, prompt: &str) -> ChatPrompt {
        let mut rendered = String::with_capacity(self.system_prompt.len() + prompt.len() + 96);
        push_turn(&mut rendered, "system", &self.system_prompt);
        push_turn(&mut rendered, "user", prompt);
        rendered.push_str("<|im_start|>assistant\n");

        ChatPrompt {
            system: self.system_prompt.clone(),
            user: prompt.to_string(),
            rendered,
        }
    }
}

fn push_turn(out: &mut String, role: &str, content: &str) {
    out.push_str("<|im_start|>");
    out.push_str(role);
    out.push('\n');
    out.push_str(content);
    out.push_str("<|im_end|>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_chatml() {
        let template = ChatTemplate::new("You are terse.");
        let prompt = template.render("hi");

        assert_eq!(
            prompt.rendered,
            "<|im_start|>system\nYou are terse.<|im_end|>\n\
             <|im_start|>user\nhi<|im_end|>\n\
             <|im_start|>assistant\n"
        );
        assert_eq!(prompt.user, "hi");
        assert_eq!(prompt.system, "You are terse.");
    }

    #[test]
    fn test_render_empty_prompt() {
        let prompt = ChatTemplate::new("sys").render("");

        assert_eq!(prompt.user, "");
        assert!(prompt.rendered.contains("<|im_start|>user\n<|im_end|>\n"));
    }
}
