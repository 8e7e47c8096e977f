use unicode_segmentation::UnicodeSegmentation;

/// First `max` grapheme clusters of `text`.
pub fn truncate_graphemes(text: &str, max: usize) -> &str {
    match text.grapheme_indices(true).nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn grapheme_len(text: &str) -> usize { text.graphemes(true).count() }

/// Truncates to `max` graphemes and appends `...` only when something was cut.
pub fn ellipsize(text: &str, max: usize) -> String {
    let head = truncate_graphemes(text, max);
    if head.len() < text.len() { format!("{head}...") } else { head.to_string() }
}

/// Greedy word wrap on Unicode word boundaries. Words longer than `width`
/// are hard-split by grapheme.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for para in text.split('\n') {
        let mut cur = String::new();
        let mut cur_len = 0usize;
        for word in para.split_word_bounds() {
            let wlen = grapheme_len(word);
            if word.trim().is_empty() {
                if cur_len > 0 && cur_len + wlen <= width { cur.push_str(word); cur_len += wlen; }
                continue;
            }
            if cur_len + wlen > width && cur_len > 0 {
                lines.push(cur.trim_end().to_string());
                cur.clear();
                cur_len = 0;
            }
            if wlen > width {
                for g in word.graphemes(true) {
                    if cur_len == width { lines.push(std::mem::take(&mut cur)); cur_len = 0; }
                    cur.push_str(g);
                    cur_len += 1;
                }
            } else {
                cur.push_str(word);
                cur_len += wlen;
            }
        }
        lines.push(cur.trim_end().to_string());
    }
    lines
}

/// Lowercased form used for keyword tests.
pub fn normalize(text: &str) -> String { text.trim().to_lowercase() }
