//! Output file naming

use chrono::Local;

/// Derives an output name from a source name and its 1-based position
pub trait NameGenerator: Send + Sync {
    fn generate(&self, original_name: &str, sequence: usize) -> String;
}

/// Prefix based naming
///
/// The prefix may contain `[BASENAME]` (source name without extension),
/// `[FILENUMBER]` and `[TIMESTAMP]`. A prefix without `[BASENAME]` is
/// prepended to the source name.
#[derive(Debug, Clone, Default)]
pub struct PrefixNameGenerator {
    prefix: String,
}

impl PrefixNameGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl NameGenerator for PrefixNameGenerator {
    fn generate(&self, original_name: &str, sequence: usize) -> String {
        let basename = original_name
            .strip_suffix(".pdf")
            .or_else(|| original_name.strip_suffix(".PDF"))
            .unwrap_or(original_name);

        let expanded = self
            .prefix
            .replace("[FILENUMBER]", &sequence.to_string())
            .replace("[TIMESTAMP]", &Local::now().format("%Y%m%d_%H%M%S").to_string());

        let name = if expanded.contains("[BASENAME]") {
            expanded.replace("[BASENAME]", basename)
        } else {
            format!("{}{}", expanded, basename)
        };
        format!("{}.pdf", name)
    }
}
