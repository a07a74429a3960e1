//! Guards against SQLite-style `?` placeholders sneaking into query
//! literals; every bind in this workspace must be Postgres `$n`.

use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Extract the string literal that opens a `sqlx::query*` call starting at
/// `call_idx`. Handles plain and raw (`r#"…"#`) literals.
fn literal_after_call(content: &str, call_idx: usize) -> Option<(usize, String)> {
    let open_paren_rel = content[call_idx..].find('(')?;
    let mut i = call_idx + open_paren_rel + 1;
    let bytes = content.as_bytes();

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    if bytes[i] == b'r' {
        let mut j = i + 1;
        let mut hashes = 0usize;
        while j < bytes.len() && bytes[j] == b'#' {
            hashes += 1;
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'"' {
            return None;
        }
        let start = j + 1;
        let mut end_marker = String::from("\"");
        end_marker.push_str(&"#".repeat(hashes));
        let end_rel = content[start..].find(&end_marker)?;
        return Some((i, content[start..start + end_rel].to_string()));
    }

    if bytes[i] == b'"' {
        let start = i + 1;
        let mut j = start;
        let mut escaped = false;
        let mut literal = String::new();
        while j < bytes.len() {
            let b = bytes[j];
            if escaped {
                // Keep line continuations and escapes out of the literal.
                if b != b'\n' {
                    literal.push(b as char);
                }
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                return Some((i, literal));
            } else {
                literal.push(b as char);
            }
            j += 1;
        }
    }

    None
}

#[test]
fn no_sqlite_placeholders_in_queries() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let roots = [
        manifest_dir.join("src"),
        manifest_dir.join("../../libs/parley-db/src"),
    ];

    let mut files = Vec::new();
    for root in &roots {
        collect_rs_files(root, &mut files);
    }
    assert!(!files.is_empty(), "source scan found no files");

    let mut violations = Vec::new();
    for file in &files {
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };
        let mut search_from = 0;
        while let Some(rel) = content[search_from..].find("sqlx::query") {
            let call_idx = search_from + rel;
            if let Some((lit_idx, literal)) = literal_after_call(&content, call_idx) {
                if literal.contains('?') {
                    violations.push(format!(
                        "{}:{} uses a `?` placeholder",
                        file.display(),
                        line_number(&content, lit_idx)
                    ));
                }
            }
            search_from = call_idx + "sqlx::query".len();
        }
    }

    assert!(
        violations.is_empty(),
        "SQLite-style placeholders found:\n{}",
        violations.join("\n")
    );
}
