//! Prefix ("forward") tokenization.
//!
//! Indexed text is split into alphanumeric words, lowercased, and every
//! prefix of every word becomes a token. A query word then matches by plain
//! term lookup: `"quan"` finds `"Quantum"` because `quan` was indexed.

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Name the forward tokenizer is registered under.
pub const FORWARD: &str = "forward";

/// Words longer than this (in bytes) are neither indexed nor queried.
pub const MAX_WORD_LEN: usize = 40;

/// Split `text` into words with their byte offsets. Words keep their
/// original case so offsets stay valid against `text`.
fn words(text: &str) -> impl Iterator<Item = (usize, &str)> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && w.len() <= MAX_WORD_LEN)
        .map(move |w| {
            // `w` is a subslice of `text`, so the pointer difference is its
            // byte offset.
            (w.as_ptr() as usize - text.as_ptr() as usize, w)
        })
}

/// The words a query searches for, deduplicated, in query order.
///
/// ```
/// use docshelf::tokenizer::query_terms;
///
/// assert_eq!(query_terms("Linear  linear-Algebra!"), vec!["linear", "algebra"]);
/// assert!(query_terms("  ,.  ").is_empty());
/// ```
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for (_, word) in words(query) {
        let word = word.to_lowercase();
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

#[derive(Clone, Default)]
pub struct ForwardTokenizer;

impl Tokenizer for ForwardTokenizer {
    type TokenStream<'a> = ForwardTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let mut tokens = Vec::new();
        for (position, (start, word)) in words(text).enumerate() {
            // Prefix ends are measured on the source word; lowercasing can
            // change a character's byte length.
            for (end, _) in word
                .char_indices()
                .skip(1)
                .chain(std::iter::once((word.len(), ' ')))
            {
                tokens.push(Token {
                    offset_from: start,
                    offset_to: start + end,
                    position,
                    text: word[..end].to_lowercase(),
                    position_length: 1,
                });
            }
        }

        ForwardTokenStream {
            tokens,
            index: 0,
            token: Token::default(),
        }
    }
}

pub struct ForwardTokenStream {
    tokens: Vec<Token>,
    index: usize,
    token: Token,
}

impl TokenStream for ForwardTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.token = self.tokens[self.index].clone();
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }
}
