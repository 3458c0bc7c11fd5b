use super::strip_line_number_prefixes;
use crate::util::static_regex;

static_regex!(fn c_fence_re, r"(?s)```(?:cpp|c|C)?[ \t]*\r?\n?(.*?)```");

fn looks_like_program(code: &str) -> bool {
    code.contains("#include") || code.contains("int main")
}

/// Pull a C program out of free-form model output.
///
/// Tries the longest fenced block first, then the span from the first
/// `#include` to the last closing brace. Returns `None` when the output holds
/// nothing recognizable so the caller can fall back to the prior version.
pub fn extract_c_code(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let longest_fence = c_fence_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .max_by_key(|block| block.len());
    if let Some(block) = longest_fence.filter(|block| looks_like_program(block)) {
        return Some(strip_line_number_prefixes(block));
    }

    let start = text.find("#include")?;
    let tail = &text[start..];
    let code = match tail.rfind('}') {
        Some(end) => &tail[..=end],
        None => tail,
    };
    let code = code.trim();
    (!code.is_empty()).then(|| strip_line_number_prefixes(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_fenced_block() {
        let text = "Here you go:\n```c\n#include <stdio.h>\nint main() { return 0; }\n```\nDone.";
        assert_eq!(
            extract_c_code(text).as_deref(),
            Some("#include <stdio.h>\nint main() { return 0; }")
        );
    }

    #[test]
    fn test_slices_from_include_to_last_brace() {
        let text = "Fixed:\n#include <stdio.h>\nint main() { return 0; }\nHope this helps.";
        assert_eq!(
            extract_c_code(text).as_deref(),
            Some("#include <stdio.h>\nint main() { return 0; }")
        );
    }

    #[test]
    fn test_strips_echoed_line_numbers() {
        let text = "```c\n  1: #include <stdio.h>\n  2: int main() { return 0; }\n```";
        assert_eq!(
            extract_c_code(text).as_deref(),
            Some("#include <stdio.h>\nint main() { return 0; }")
        );
    }

    #[test]
    fn test_prose_only_is_none() {
        assert!(extract_c_code("I could not fix this program.").is_none());
        assert!(extract_c_code("   ").is_none());
    }
}
