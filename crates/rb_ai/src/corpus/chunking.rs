use rb_core::chunks::DocumentChunk;

pub const DEFAULT_MAX_CHARS: usize = 1600;
const MAX_HEADER_LEVEL: usize = 5;

struct Section {
    headers: Vec<(usize, String)>,
    body: String,
}

fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// `Some((level, title))` for an ATX header of level 1..=5.
fn parse_header(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > MAX_HEADER_LEVEL {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((level, title.to_string()))
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut path: Vec<(usize, String)> = Vec::new();
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let header = if in_fence { None } else { parse_header(line) };
        match header {
            Some((level, title)) => {
                if !body.trim().is_empty() {
                    sections.push(Section {
                        headers: path.clone(),
                        body: std::mem::take(&mut body),
                    });
                }
                body.clear();
                path.retain(|(l, _)| *l < level);
                path.push((level, title));
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    if !body.trim().is_empty() {
        sections.push(Section { headers: path, body });
    }
    sections
}

/// Greedy paragraph packing. A single paragraph longer than `max_chars`
/// becomes its own chunk.
fn pack_paragraphs(body: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    for p in body.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let add_len = if buf.is_empty() { p.len() } else { 2 + p.len() };
        if !buf.is_empty() && buf.len() + add_len > max_chars {
            out.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(p);
    }
    if !buf.trim().is_empty() {
        out.push(buf);
    }
    out
}

/// Split one markdown document into chunks that never straddle a header.
/// Each chunk carries the enclosing headers as `"Header 1"`..`"Header 5"`
/// metadata and is named `{doc_name}_chunk_{n}`.
pub fn chunk_markdown(doc_name: &str, text: &str, max_chars: usize) -> Vec<DocumentChunk> {
    let max_chars = max_chars.max(1);
    let normalized = normalize_text(text);

    let mut out = Vec::new();
    for section in split_sections(&normalized) {
        for piece in pack_paragraphs(&section.body, max_chars) {
            let mut chunk = DocumentChunk::new(format!("{doc_name}_chunk_{}", out.len()), piece);
            for (level, title) in section.headers.iter() {
                chunk = chunk.with_metadata(format!("Header {level}"), title.clone());
            }
            out.push(chunk);
        }
    }
    out
}

/// Document name for a source file: the file stem with anything other than
/// ASCII alphanumerics, `-` and `_` replaced by `_`.
pub fn document_name_for_path(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "document".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn header_path_follows_nesting() {
        let md = "# Policy\n\nIntro text.\n\n## Scope\n\nScope text.\n\n### Data\n\nData text.\n\n## Retention\n\nKeep 7 years.\n";
        let chunks = chunk_markdown("POLICY", md, 1600);
        assert_eq!(chunks.len(), 4);

        assert_eq!(chunks[0].chunk_id, "POLICY_chunk_0");
        assert_eq!(chunks[0].chunk_content, "Intro text.");
        assert_eq!(chunks[0].chunk_metadata["Header 1"], json!("Policy"));
        assert!(!chunks[0].chunk_metadata.contains_key("Header 2"));

        assert_eq!(chunks[2].chunk_metadata["Header 3"], json!("Data"));
        assert_eq!(chunks[2].chunk_metadata["Header 2"], json!("Scope"));

        // Leaving a level drops the deeper headers.
        assert_eq!(chunks[3].chunk_metadata["Header 2"], json!("Retention"));
        assert!(!chunks[3].chunk_metadata.contains_key("Header 3"));
        assert_eq!(chunks[3].document_name(), "POLICY");
    }

    #[test]
    fn paragraphs_are_packed_up_to_max_chars() {
        let md = "aaaa\n\nbbbb\n\ncccc\n";
        let chunks = chunk_markdown("d", md, 10);
        let texts: Vec<&str> = chunks.iter().map(|c| c.chunk_content.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn hashes_inside_code_fences_and_level_six_are_text() {
        let md = "# Top\n\n```\n# not a header\n```\n\n###### tiny\n";
        let chunks = chunk_markdown("d", md, 1600);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chunk_content.contains("# not a header"));
        assert!(chunks[0].chunk_content.contains("###### tiny"));
    }

    #[test]
    fn parse_header_rules() {
        assert_eq!(parse_header("## Title ##"), Some((2, "Title".to_string())));
        assert_eq!(parse_header("#hashtag"), None);
        assert_eq!(parse_header("    # indented code"), None);
        assert_eq!(parse_header("#"), Some((1, String::new())));
    }

    #[test]
    fn document_name_for_path_sanitizes() {
        let p = std::path::Path::new("/tmp/AI Policy v2.md");
        assert_eq!(document_name_for_path(p), "AI_Policy_v2");
    }
}
