/// Outbound message emitted toward the presentation layer: prompt text plus
/// the set of selectable tokens. The transport decides how to render them.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub text: String,
    pub choices: Vec<Choice>,
    pub html: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Choice {
    pub label: String,
    pub token: String,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
            html: false,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
            html: true,
        }
    }

    pub fn with_choice(mut self, label: impl Into<String>, token: impl Into<String>) -> Self {
        self.choices.push(Choice {
            label: label.into(),
            token: token.into(),
        });
        self
    }
}
