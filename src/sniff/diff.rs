use std::io;
use std::str::Lines;

use super::Line;

/// Yields only the lines a unified patch adds, numbered as in the new file.
///
/// Removed and context lines are consumed to keep numbering right but never
/// yielded. Files deleted by the patch (`+++ /dev/null`) yield nothing.
pub struct DiffLines<'a> {
    lines: Lines<'a>,
    path: Option<String>,
    next_line: usize,
    in_header: bool,
}

impl<'a> DiffLines<'a> {
    pub fn new(patch: &'a str) -> Self {
        Self {
            lines: patch.lines(),
            path: None,
            next_line: 0,
            in_header: true,
        }
    }

    fn start_hunk(&mut self, header: &str) {
        self.in_header = false;
        self.next_line = parse_new_start(header).unwrap_or(1);
    }
}

impl Iterator for DiffLines<'_> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;

            if raw.starts_with("diff --git ") {
                self.path = None;
                self.in_header = true;
                continue;
            }
            if raw.starts_with("@@ ") {
                self.start_hunk(raw);
                continue;
            }
            if self.in_header {
                if let Some(target) = raw.strip_prefix("+++ ") {
                    self.path = parse_target_path(target);
                }
                continue;
            }

            match raw.as_bytes().first() {
                Some(b'+') => {
                    let line_number = self.next_line;
                    self.next_line += 1;
                    if let Some(path) = &self.path {
                        return Some(Ok(Line {
                            path: path.clone(),
                            line_number,
                            content: raw[1..].to_string(),
                        }));
                    }
                }
                Some(b' ') => self.next_line += 1,
                // '-' lines and "\ No newline at end of file"
                _ => {}
            }
        }
    }
}

/// `@@ -12,3 +14,5 @@ ...` -> 14
fn parse_new_start(header: &str) -> Option<usize> {
    let plus = header.split_whitespace().find(|part| part.starts_with('+'))?;
    let start = plus[1..].split(',').next()?;
    start.parse().ok()
}

fn parse_target_path(target: &str) -> Option<String> {
    let target = target.trim_end();
    if target == "/dev/null" {
        return None;
    }
    // git quotes paths with spaces or special bytes: +++ "b/with space"
    let unquoted = target.trim_matches('"');
    let path = unquoted.strip_prefix("b/").unwrap_or(unquoted);
    Some(path.to_string())
}
