use std::path::{Path, PathBuf};

use crate::error::InputError;

/// Test framework used when none is given on the command line.
pub fn infer_framework(path: &Path) -> Result<&'static str, InputError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "rs" => Ok("Rust #[test]"),
        "py" => Ok("pytest"),
        "js" | "jsx" | "ts" | "tsx" => Ok("Jest"),
        "go" => Ok("Go testing"),
        "java" => Ok("JUnit 5"),
        "cs" => Ok("xUnit"),
        "rb" => Ok("RSpec"),
        _ => Err(InputError::Unsupported {
            kind: "source file extension",
            value: path.display().to_string(),
        }),
    }
}

/// `src/calc.py` becomes `src/calc_test.py`.
pub fn output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("generated");
    let file_name = match source.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{stem}_test.{ext}"),
        None => format!("{stem}_test"),
    };
    source.with_file_name(file_name)
}

pub fn build_prompt(file_name: &str, source: &str, framework: &str) -> String {
    format!(
        "Write thorough unit tests for the file `{file_name}` using {framework}.\n\
Cover normal behaviour, edge cases and error paths. Reply with a single fenced \
code block containing the complete test file and nothing else.\n\n\
```\n{source}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_follows_extension() {
        assert_eq!(infer_framework(Path::new("calc.py")).unwrap(), "pytest");
        assert_eq!(infer_framework(Path::new("src/App.TSX")).unwrap(), "Jest");
        assert!(matches!(
            infer_framework(Path::new("notes.txt")),
            Err(InputError::Unsupported { .. })
        ));
        assert!(infer_framework(Path::new("Makefile")).is_err());
    }

    #[test]
    fn output_sits_next_to_source() {
        assert_eq!(
            output_path(Path::new("src/calc.py")),
            PathBuf::from("src/calc_test.py")
        );
        assert_eq!(output_path(Path::new("lib.rs")), PathBuf::from("lib_test.rs"));
    }

    #[test]
    fn prompt_embeds_source_and_framework() {
        let prompt = build_prompt("calc.py", "def add(a, b):\n    return a + b", "pytest");
        assert!(prompt.contains("`calc.py` using pytest"));
        assert!(prompt.contains("return a + b"));
    }
}
