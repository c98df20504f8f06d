//! Extraction of a language-tagged fenced code block from model output.

use crate::error::{Error, Result};
use memchr::memmem;

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingOpen,
    InCode,
    Done,
}

/// Returns the body of the first code block opened with `` ```<tag> ``.
///
/// The tag is lowercased before matching and must end at whitespace or the end
/// of the text, so `py` does not match a `python` fence. Everything after the
/// opening line is copied verbatim up to a line that is only a closing fence;
/// that line and the rest of the text are dropped. When the closing fence
/// never arrives (the request's stop sequence usually cuts it off) the whole
/// remainder is returned.
///
/// # Errors
///
/// Returns [`Error::Extraction`] carrying the complete `text` if no opening
/// fence for `tag` is present.
///
/// # Examples
///
/// ```
/// use h1_code::extract_code_block;
///
/// let reply = "Sure:\n```python\nprint('hi')\n```\nDone.";
/// assert_eq!(extract_code_block(reply, "Python").unwrap(), "print('hi')\n");
/// assert!(extract_code_block("Error: binary file", "python").is_err());
/// ```
pub fn extract_code_block(text: &str, tag: &str) -> Result<String> {
    let tag = tag.to_lowercase();
    let marker = format!("{FENCE}{tag}");

    let mut state = State::SeekingOpen;
    let mut cursor = 0;
    let mut code = String::new();

    while state != State::Done {
        state = match state {
            State::SeekingOpen => match find_opening(text, &marker) {
                Some(body_start) => {
                    cursor = body_start;
                    State::InCode
                }
                None => return Err(Error::extraction(tag, text)),
            },
            State::InCode => {
                for line in text[cursor..].split_inclusive('\n') {
                    if line.trim() == FENCE {
                        break;
                    }
                    code.push_str(line);
                }
                State::Done
            }
            State::Done => State::Done,
        };
    }

    Ok(code)
}

/// Byte offset of the line following the first valid opening fence.
fn find_opening(text: &str, marker: &str) -> Option<usize> {
    memmem::find_iter(text.as_bytes(), marker.as_bytes()).find_map(|start| {
        let after = start + marker.len();
        let rest = &text[after..];
        match rest.chars().next() {
            None => Some(text.len()),
            Some(c) if c.is_whitespace() => {
                Some(rest.find('\n').map_or(text.len(), |nl| after + nl + 1))
            }
            Some(_) => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_code_after_fence() {
        let text = "```python\nCODE\n```";
        let code = extract_code_block(text, "python").unwrap();
        assert!(code.starts_with("CODE"));
        assert_eq!(code, "CODE\n");
    }

    #[test]
    fn test_keeps_everything_without_closing_fence() {
        let text = "Here it is:\n```rust\nfn main() {\n    run();\n}\n";
        let code = extract_code_block(text, "rust").unwrap();
        assert_eq!(code, "fn main() {\n    run();\n}\n");
    }

    #[test]
    fn test_drops_text_after_closing_fence() {
        let text = "```go\npackage main\n```\nThis version is cleaner.";
        assert_eq!(extract_code_block(text, "go").unwrap(), "package main\n");
    }

    #[test]
    fn test_closing_fence_with_trailing_spaces() {
        let text = "```go\nx := 1\n```   \nmore";
        assert_eq!(extract_code_block(text, "go").unwrap(), "x := 1\n");
    }

    #[test]
    fn test_tag_is_lowercased() {
        let text = "```dart\nvoid main() {}\n```\n";
        assert_eq!(
            extract_code_block(text, "Dart").unwrap(),
            "void main() {}\n"
        );
    }

    #[test]
    fn test_uppercase_fence_in_response_does_not_match() {
        let text = "```Dart\nvoid main() {}\n```\n";
        assert!(extract_code_block(text, "dart").is_err());
    }

    #[test]
    fn test_tag_prefix_does_not_match_longer_tag() {
        let text = "```python\nprint(1)\n```\n```py\nprint(2)\n```\n";
        assert_eq!(extract_code_block(text, "py").unwrap(), "print(2)\n");
    }

    #[test]
    fn test_versioned_tag_is_not_the_requested_language() {
        let text = "```python3\nprint(1)\n```\n";
        match extract_code_block(text, "python") {
            Err(Error::Extraction { tag, response }) => {
                assert_eq!(tag, "python");
                assert_eq!(response, text);
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        assert_eq!(extract_code_block(text, "python3").unwrap(), "print(1)\n");
    }

    #[test]
    fn test_info_string_after_tag_is_skipped() {
        let text = "```ts title=\"app.ts\"\nconst a = 1;\n```";
        assert_eq!(extract_code_block(text, "ts").unwrap(), "const a = 1;\n");
    }

    #[test]
    fn test_crlf_fences() {
        let text = "```c\r\nint x;\r\n```\r\n";
        assert_eq!(extract_code_block(text, "c").unwrap(), "int x;\r\n");
    }

    #[test]
    fn test_first_matching_block_wins() {
        let text = "```js\nfirst();\n```\n```js\nsecond();\n```\n";
        assert_eq!(extract_code_block(text, "js").unwrap(), "first();\n");
    }

    #[test]
    fn test_other_language_blocks_are_ignored() {
        let text = "```bash\nls\n```\n```lua\nprint(1)\n```";
        assert_eq!(extract_code_block(text, "lua").unwrap(), "print(1)\n");
    }

    #[test]
    fn test_fence_at_end_of_text_is_empty_code() {
        assert_eq!(extract_code_block("```zig", "zig").unwrap(), "");
    }

    #[test]
    fn test_missing_fence_carries_full_text() {
        let text = "Error: this file is a binary blob and cannot be converted";
        match extract_code_block(text, "Python") {
            Err(Error::Extraction { tag, response }) => {
                assert_eq!(tag, "python");
                assert_eq!(response, text);
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_untagged_fence_is_a_failure() {
        let text = "```\nprint(1)\n```";
        assert!(extract_code_block(text, "python").is_err());
    }
}
