//! Reader and writer for the PGN subset the repertoire produces: header
//! tags, a mainline with nested variations, `{}` comments and `$n` NAGs.

use std::collections::BTreeSet;

use engine::Color;
use thiserror::Error;

use super::tree::{Headers, PgnTree, TreeId};

#[derive(Debug, Error)]
pub enum PgnError {
    #[error("malformed header line: {0}")]
    BadHeader(String),
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("malformed NAG token: {0}")]
    BadNag(String),
    #[error("variation marker before any move")]
    VariationBeforeMove,
    #[error("unbalanced variation parentheses")]
    UnbalancedVariation,
    #[error("document contains no games")]
    Empty,
}

/// A parsed notation node, not yet resolved against the rules engine.
#[derive(Clone, Debug, Default)]
pub struct RawNode {
    pub san: Option<String>,
    pub comment: String,
    pub nags: BTreeSet<u8>,
    pub variations: Vec<RawNode>,
}

#[derive(Clone, Debug)]
pub struct RawGame {
    pub headers: Headers,
    pub root: RawNode,
}

// ---------------------------------------------------------------------------
// Writing

/// Render one document. The movetext always terminates with `*`.
pub fn write_document(tree: &PgnTree) -> String {
    let mut out = String::new();
    for (key, value) in tree.headers.iter() {
        out.push_str(&format!("[{} \"{}\"]\n", key, value.replace('"', "\\\"")));
    }
    if !tree.headers.is_empty() {
        out.push('\n');
    }

    let mut tokens: Vec<String> = Vec::new();
    let root = tree.node(tree.root());
    let root_comment = sanitize_comment(&root.comment);
    if !root_comment.is_empty() {
        tokens.push(format!("{{ {root_comment} }}"));
    }

    let white_to_move = root.fingerprint.side_to_move() == Color::White;
    write_variations(tree, tree.root(), 1, white_to_move, true, &mut tokens);
    tokens.push("*".to_string());

    out.push_str(&tokens.join(" "));
    out.push('\n');
    out
}

/// Render several documents separated by blank lines.
pub fn write_documents<'a>(trees: impl IntoIterator<Item = &'a PgnTree>) -> String {
    trees
        .into_iter()
        .map(write_document)
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_variations(
    tree: &PgnTree,
    id: TreeId,
    number: u32,
    white: bool,
    force_number: bool,
    tokens: &mut Vec<String>,
) {
    let variations = &tree.node(id).variations;
    let Some((&first, alternatives)) = variations.split_first() else {
        return;
    };

    emit_move(tree, first, number, white, force_number, tokens);

    for &alt in alternatives {
        tokens.push("(".to_string());
        emit_move(tree, alt, number, white, true, tokens);
        let (next_number, next_white) = advance(number, white);
        let interrupted = !tree.node(alt).comment.is_empty();
        write_variations(tree, alt, next_number, next_white, interrupted, tokens);
        tokens.push(")".to_string());
    }

    let first_node = tree.node(first);
    let interrupted = !alternatives.is_empty() || !first_node.comment.is_empty();
    let (next_number, next_white) = advance(number, white);
    write_variations(tree, first, next_number, next_white, interrupted, tokens);
}

fn emit_move(
    tree: &PgnTree,
    id: TreeId,
    number: u32,
    white: bool,
    force_number: bool,
    tokens: &mut Vec<String>,
) {
    let node = tree.node(id);
    let san = node.san.as_deref().unwrap_or("--");

    if white {
        tokens.push(format!("{number}."));
    } else if force_number {
        tokens.push(format!("{number}..."));
    }
    tokens.push(san.to_string());

    for nag in &node.nags {
        tokens.push(format!("${nag}"));
    }
    let comment = sanitize_comment(&node.comment);
    if !comment.is_empty() {
        tokens.push(format!("{{ {comment} }}"));
    }
}

/// Braces cannot appear inside a `{}` comment; a stray `}` would end the
/// comment early on re-parse, so both are dropped on output.
fn sanitize_comment(comment: &str) -> String {
    if comment.contains(['{', '}']) {
        comment.replace(['{', '}'], "").trim().to_string()
    } else {
        comment.to_string()
    }
}

fn advance(number: u32, white: bool) -> (u32, bool) {
    if white {
        (number, false)
    } else {
        (number + 1, true)
    }
}

// ---------------------------------------------------------------------------
// Parsing

/// Parse the first document in `text`.
pub fn parse_document(text: &str) -> Result<RawGame, PgnError> {
    parse_documents(text)?.into_iter().next().ok_or(PgnError::Empty)
}

/// Parse every document in `text`.
pub fn parse_documents(text: &str) -> Result<Vec<RawGame>, PgnError> {
    let mut games = Vec::new();
    for block in split_games(text) {
        games.push(parse_game(&block)?);
    }
    if games.is_empty() {
        return Err(PgnError::Empty);
    }
    Ok(games)
}

/// Split on header blocks: a `[` line that follows movetext starts a new game.
fn split_games(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut seen_movetext = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && seen_movetext {
            if !current.trim().is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            seen_movetext = false;
        } else if !trimmed.is_empty() && !trimmed.starts_with('[') {
            seen_movetext = true;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_game(block: &str) -> Result<RawGame, PgnError> {
    let mut headers = Headers::default();
    let mut movetext = String::new();

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && movetext.trim().is_empty() {
            let (key, value) = parse_header(trimmed)?;
            headers.set(&key, value);
        } else if trimmed.starts_with('%') {
            continue;
        } else {
            movetext.push_str(line);
            movetext.push('\n');
        }
    }

    let root = parse_movetext(&movetext)?;
    Ok(RawGame { headers, root })
}

fn parse_header(line: &str) -> Result<(String, String), PgnError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| PgnError::BadHeader(line.to_string()))?;
    let (key, rest) = inner
        .split_once(' ')
        .ok_or_else(|| PgnError::BadHeader(line.to_string()))?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| PgnError::BadHeader(line.to_string()))?;
    Ok((key.to_string(), value.replace("\\\"", "\"")))
}

#[derive(Debug)]
enum Token {
    San(String),
    Comment(String),
    Nag(u8),
    Open,
    Close,
}

fn tokenize(movetext: &str) -> Result<Vec<Token>, PgnError> {
    let mut tokens = Vec::new();
    let mut chars = movetext.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '{' => {
                let rest = &movetext[start + 1..];
                let end = rest.find('}').ok_or(PgnError::UnterminatedComment)?;
                tokens.push(Token::Comment(rest[..end].trim().to_string()));
                while let Some(&(idx, _)) = chars.peek() {
                    if idx > start + end + 1 {
                        break;
                    }
                    chars.next();
                }
            }
            ';' => {
                while let Some(&(_, next)) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '$' => {
                let mut digits = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() {
                        digits.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let nag = digits
                    .parse()
                    .map_err(|_| PgnError::BadNag(format!("${digits}")))?;
                tokens.push(Token::Nag(nag));
            }
            _ => {
                let mut word = String::new();
                word.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | '{') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                if let Some(san) = classify_word(&word) {
                    tokens.push(Token::San(san));
                }
            }
        }
    }
    Ok(tokens)
}

/// Strip move numbers and game results; return the SAN if any remains.
/// Handles glued forms like `1.e4` and `12...Nf6`, and drops `!?` suffixes.
fn classify_word(word: &str) -> Option<String> {
    if matches!(word, "1-0" | "0-1" | "1/2-1/2" | "*") {
        return None;
    }
    let stripped = word
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches('.');
    let stripped = stripped.trim_end_matches(['!', '?']);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn parse_movetext(movetext: &str) -> Result<RawNode, PgnError> {
    struct Tmp {
        san: Option<String>,
        comment: String,
        nags: BTreeSet<u8>,
        children: Vec<usize>,
        parent: usize,
    }

    let mut nodes = vec![Tmp {
        san: None,
        comment: String::new(),
        nags: BTreeSet::new(),
        children: Vec::new(),
        parent: 0,
    }];
    let mut cursor = 0usize;
    let mut saved: Vec<usize> = Vec::new();

    for token in tokenize(movetext)? {
        match token {
            Token::San(san) => {
                let id = nodes.len();
                nodes.push(Tmp {
                    san: Some(san),
                    comment: String::new(),
                    nags: BTreeSet::new(),
                    children: Vec::new(),
                    parent: cursor,
                });
                nodes[cursor].children.push(id);
                cursor = id;
            }
            Token::Comment(comment) => {
                let slot = &mut nodes[cursor].comment;
                if slot.is_empty() {
                    *slot = comment;
                } else if !comment.is_empty() {
                    slot.push(' ');
                    slot.push_str(&comment);
                }
            }
            Token::Nag(nag) => {
                nodes[cursor].nags.insert(nag);
            }
            Token::Open => {
                if cursor == 0 {
                    return Err(PgnError::VariationBeforeMove);
                }
                saved.push(cursor);
                cursor = nodes[cursor].parent;
            }
            Token::Close => {
                cursor = saved.pop().ok_or(PgnError::UnbalancedVariation)?;
            }
        }
    }
    if !saved.is_empty() {
        return Err(PgnError::UnbalancedVariation);
    }

    fn build(nodes: &[Tmp], id: usize) -> RawNode {
        RawNode {
            san: nodes[id].san.clone(),
            comment: nodes[id].comment.clone(),
            nags: nodes[id].nags.clone(),
            variations: nodes[id]
                .children
                .iter()
                .map(|&child| build(nodes, child))
                .collect(),
        }
    }

    Ok(build(&nodes, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variations_comments_and_nags() {
        let text = "[Event \"Test\"]\n\n1. e4 $1 { main } e5 ( 1... c5 { sicilian } 2. Nf3 ) 2. Nf3 *\n";
        let game = parse_document(text).unwrap();
        assert_eq!(game.headers.get("Event"), Some("Test"));

        let e4 = &game.root.variations[0];
        assert_eq!(e4.san.as_deref(), Some("e4"));
        assert_eq!(e4.comment, "main");
        assert!(e4.nags.contains(&1));
        assert_eq!(e4.variations.len(), 2);

        let c5 = &e4.variations[1];
        assert_eq!(c5.san.as_deref(), Some("c5"));
        assert_eq!(c5.comment, "sicilian");
        assert_eq!(c5.variations[0].san.as_deref(), Some("Nf3"));
    }

    #[test]
    fn parses_glued_move_numbers() {
        let game = parse_document("1.e4 e5 2.Nf3!? Nc6 *").unwrap();
        let mut node = &game.root;
        let mut sans = Vec::new();
        while let Some(next) = node.variations.first() {
            sans.push(next.san.clone().unwrap());
            node = next;
        }
        assert_eq!(sans, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn splits_multiple_games() {
        let text = "[Round \"1\"]\n\n1. e4 *\n\n[Round \"2\"]\n\n1. d4 *\n";
        let games = parse_documents(text).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].headers.get("Round"), Some("2"));
        assert_eq!(games[1].root.variations[0].san.as_deref(), Some("d4"));
    }

    #[test]
    fn braces_in_comments_do_not_break_the_round_trip() {
        use engine::Board;

        let mut tree = PgnTree::new(Board::initial().fingerprint());
        let root = tree.root();
        let board = Board::initial();
        let e4 = board.parse_san("e4").unwrap();
        let id = tree.add_variation(root, e4.uci(), e4.san(), board.play(&e4).fingerprint());
        tree.node_mut(id).comment = "from {an imported} file }".to_string();
        let next = board.play(&e4);
        let e5 = next.parse_san("e5").unwrap();
        tree.add_variation(id, e5.uci(), e5.san(), next.play(&e5).fingerprint());

        let game = parse_document(&write_document(&tree)).unwrap();
        let e4_raw = &game.root.variations[0];
        assert_eq!(e4_raw.comment, "from an imported file");
        // The move after the comment survives the round trip.
        assert_eq!(e4_raw.variations[0].san.as_deref(), Some("e5"));
    }

    #[test]
    fn rejects_unbalanced_variations() {
        assert!(matches!(
            parse_document("1. e4 ( 1... e5 *"),
            Err(PgnError::UnbalancedVariation)
        ));
        assert!(matches!(
            parse_document("( 1. e4 ) *"),
            Err(PgnError::VariationBeforeMove)
        ));
    }
}
