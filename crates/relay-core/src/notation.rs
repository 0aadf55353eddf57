//! FEN normalization
//!
//! Engines dump positions as EPD (`... w KQkq - bm 1; id 1;`) or as a
//! `setboard` command without counters. The halfmove/fullmove trailer is
//! always rebuilt from the game history since the engine's own counter
//! does not survive across sessions.

/// Rebuild a FEN string from an engine dump, replacing its trailer with
/// `0 <fullmove>`. Returns `None` if the dump has no piece placement and
/// side to move.
pub fn normalize_fen(raw: &str, fullmove: usize) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("setboard").unwrap_or(raw);
    let record = raw.split(';').next().unwrap_or_default();
    let mut fields = record.split_whitespace();

    let placement = fields.next().filter(|p| is_placement(p))?;
    let side = fields.next().filter(|s| matches!(*s, "w" | "b"))?;
    let castling = fields.next().filter(|c| is_castling(c));
    let en_passant = castling
        .and_then(|_| fields.next())
        .filter(|e| is_en_passant(e));

    Some(format!(
        "{} {} {} {} 0 {}",
        placement,
        side,
        castling.unwrap_or("-"),
        en_passant.unwrap_or("-"),
        fullmove
    ))
}

fn is_placement(field: &str) -> bool {
    field.split('/').count() == 8
        && field
            .chars()
            .all(|c| c == '/' || ('1'..='8').contains(&c) || "rnbqkpRNBQKP".contains(c))
}

fn is_castling(field: &str) -> bool {
    field == "-" || (!field.is_empty() && field.chars().all(|c| "KQkq".contains(c)))
}

fn is_en_passant(field: &str) -> bool {
    let bytes = field.as_bytes();
    field == "-"
        || (bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && matches!(bytes[1], b'3' | b'6'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

    #[test]
    fn test_epd_dump() {
        let raw = "rnbqkbnr/ppp1pppp/8/8/P3p3/8/1PPP1PPP/RNBQKBNR w KQkq - bm 1; id 1;\n";
        assert_eq!(
            normalize_fen(raw, 3).as_deref(),
            Some("rnbqkbnr/ppp1pppp/8/8/P3p3/8/1PPP1PPP/RNBQKBNR w KQkq - 0 3")
        );
    }

    #[test]
    fn test_setboard_without_counters() {
        let raw = format!("setboard {} w KQkq", START);
        assert_eq!(
            normalize_fen(&raw, 1),
            Some(format!("{} w KQkq - 0 1", START))
        );
    }

    #[test]
    fn test_full_fen_trailer_replaced() {
        let raw = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 17";
        assert_eq!(
            normalize_fen(raw, 2).as_deref(),
            Some("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2")
        );
    }

    #[test]
    fn test_rejects_non_positions() {
        assert_eq!(normalize_fen("", 1), None);
        assert_eq!(normalize_fen("White (1) :", 1), None);
        assert_eq!(normalize_fen(&format!("{} x KQkq", START), 1), None);
    }
}
