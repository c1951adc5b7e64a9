//! Best-effort input sanitizer.
//!
//! Strips script blocks, style blocks, HTML tags and multi-line markup
//! comments from externally supplied values before they reach the pipeline.
//! This is a denylist filter for defense in depth; the display layer still
//! owns output encoding.

use serde_json::Value;

pub struct Sanitizer {
    strip_slashes: bool,
}

impl Sanitizer {
    /// `strip_slashes` reverses legacy backslash-escaping first, for hosts
    /// that double-escape inbound payloads.
    pub fn new(strip_slashes: bool) -> Self {
        Self { strip_slashes }
    }

    pub fn clean_str(&self, input: &str) -> String {
        let input = if self.strip_slashes {
            strip_slashes(input)
        } else {
            input.to_string()
        };

        // Block patterns must run before the any-tag pattern, which would
        // otherwise consume the opening/closing tags and leave the contents.
        let patterns = [
            r"(?is)<script[^>]*?>.*?</script>", // script blocks including contents
            r"(?is)<style[^>]*?>.*?</style>",   // style blocks including contents
            r"(?s)<![\s\S]*?--[ \t\n\r]*>",     // multi-line markup comments
            r"(?is)<[/!]*?[^<>]*?>",            // any remaining tag
        ];

        let mut output = input;
        for pattern in patterns {
            let re = regex::Regex::new(pattern).unwrap();
            output = re.replace_all(&output, "").into_owned();
        }
        output
    }

    /// Recursively clean every string in a JSON value, preserving keys,
    /// structure and non-string scalars.
    pub fn clean_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.clean_str(&s)),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.clean_value(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.clean_value(v)).collect())
            }
            other => other,
        }
    }
}

fn strip_slashes(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                output.push(next);
            }
        } else {
            output.push(c);
        }
    }
    output
}
