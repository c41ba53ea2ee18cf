//! Character-budgeted text splitting with overlap.

/// Split text into chunks of at most `chunk_chars` characters, overlapping by
/// roughly `overlap_chars` to maintain context continuity.
///
/// Prefers breaking at whitespace within the last fifth of the window so
/// words stay intact. Operates on characters, never bytes, so multi-byte
/// text is always split at valid boundaries.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }

    let overlap = overlap_chars.min(chunk_chars.saturating_sub(1));
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let window_end = (start + chunk_chars).min(chars.len());

        let break_at = if window_end < chars.len() {
            // look for whitespace in the last 20% of the window
            let search_from = window_end.saturating_sub(chunk_chars / 5).max(start + 1);
            (search_from..window_end)
                .rev()
                .find(|&i| chars[i].is_whitespace())
                .map(|i| i + 1)
                .unwrap_or(window_end)
        } else {
            window_end
        };

        let chunk: String = chars[start..break_at].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        if break_at >= chars.len() {
            break;
        }
        // overlap never stalls progress: the new start is strictly past the
        // previous one
        start = break_at.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 20).is_empty());
        assert!(chunk_text("   \n  ", 100, 20).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("a short sentence", 100, 20);
        assert_eq!(chunks, vec!["a short sentence"]);
    }

    #[test]
    fn test_long_text_multiple_chunks() {
        let words = "lorem ipsum dolor sit amet ".repeat(50);
        let chunks = chunk_text(&words, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_overlap_repeats_content() {
        let words = "alpha beta gamma delta epsilon zeta eta theta ".repeat(10);
        let chunks = chunk_text(&words, 80, 30);
        assert!(chunks.len() > 1);
        // the tail of each chunk reappears at the head of the next
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<String>()
                .chars().rev().collect();
            assert!(
                pair[1].contains(tail.trim()),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_breaks_at_word_boundary() {
        let words = "word ".repeat(100);
        let chunks = chunk_text(&words, 52, 0);
        for chunk in &chunks {
            assert!(!chunk.starts_with("ord"), "mid-word split: {:?}", chunk);
        }
    }

    #[test]
    fn test_unbroken_text_still_chunks() {
        let solid = "x".repeat(500);
        let chunks = chunk_text(&solid, 100, 10);
        assert!(chunks.len() >= 5);
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "日本語のテキスト、絵文字🎉、アクセントéàü ".repeat(30);
        let chunks = chunk_text(&text, 50, 10);
        assert!(!chunks.is_empty());
        // reconstruction must not panic on any boundary
        for chunk in chunks {
            let _ = chunk.chars().count();
        }
    }

    #[test]
    fn test_terminates_with_pathological_overlap() {
        // overlap >= chunk size is clamped so progress is always made
        let chunks = chunk_text(&"word ".repeat(100), 20, 20);
        assert!(!chunks.is_empty());
    }
}
