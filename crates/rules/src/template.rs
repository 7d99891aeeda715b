use crate::labels::Labels;

#[derive(Debug)]
pub struct TemplateError(pub String);

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "template: {}", self.0)
    }
}

impl std::error::Error for TemplateError {}

/// Values a label or annotation template may reference.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub labels: Labels,
    pub value: String,
    pub threshold: String,
}

pub trait TemplateExpander: Send + Sync {
    fn expand(&self, text: &str, data: &TemplateData) -> Result<String, TemplateError>;

    /// Syntax check performed when a rule is admitted.
    fn check(&self, text: &str) -> Result<(), TemplateError> {
        self.expand(text, &TemplateData::default()).map(|_| ())
    }
}

/// Expands `{{$value}}`, `{{$threshold}}` and `{{$labels.name}}` (or the `.Value`,
/// `.Threshold`, `.Labels.name` spellings). Anything else between braces is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleExpander;

impl SimpleExpander {
    fn resolve(action: &str, data: &TemplateData) -> Result<String, TemplateError> {
        match action {
            "$value" | ".Value" => return Ok(data.value.clone()),
            "$threshold" | ".Threshold" => return Ok(data.threshold.clone()),
            _ => {}
        }
        let name = action
            .strip_prefix("$labels.")
            .or_else(|| action.strip_prefix(".Labels."));
        match name {
            Some(n) if !n.is_empty() => Ok(data.labels.get(n).unwrap_or_default().to_string()),
            _ => Err(TemplateError(format!("undefined variable {action:?}"))),
        }
    }
}

impl TemplateExpander for SimpleExpander {
    fn expand(&self, text: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| TemplateError("unclosed action".into()))?;
            let action = after[..close].trim();
            out.push_str(&Self::resolve(action, data)?);
            rest = &after[close + 2..];
        }
        if rest.contains("}}") {
            return Err(TemplateError("unexpected \"}}\"".into()));
        }
        out.push_str(rest);
        Ok(out)
    }
}
