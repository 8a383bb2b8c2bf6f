//! A small, borrowing HTML tokenizer for template markup.
//!
//! Tokens are slices into the input and carry their byte offsets;
//! tag and attribute names keep their case and attribute order is
//! kept as written. Entities are *not* decoded, so that templates
//! are seen exactly as typed. Documents are parsed with html5gum
//! instead (see `parse`).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeValue<'s> {
    pub text: &'s str,
    /// Byte offset of `text` (after the opening quote, if any).
    pub offset: usize,
    pub quote: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'s> {
    pub name: &'s str,
    pub offset: usize,
    pub value: Option<AttributeValue<'s>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'s> {
    StartTag {
        name: &'s str,
        attributes: Vec<Attribute<'s>>,
        self_closing: bool,
        offset: usize,
    },
    EndTag {
        name: &'s str,
        offset: usize,
    },
    Text {
        text: &'s str,
        offset: usize,
    },
    Comment {
        text: &'s str,
        offset: usize,
    },
    /// `<!DOCTYPE ...>` and other `<!...>` declarations, content
    /// without the brackets.
    Declaration {
        text: &'s str,
        offset: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("tag starting at byte {offset} is not terminated")]
    UnterminatedTag { offset: usize },
    #[error("comment starting at byte {offset} is not terminated")]
    UnterminatedComment { offset: usize },
    #[error("attribute value starting at byte {offset} is missing its closing quote")]
    UnterminatedAttributeValue { offset: usize },
}

pub struct Tokenizer<'s> {
    input: &'s str,
    pos: usize,
    failed: bool,
}

impl<'s> Tokenizer<'s> {
    pub fn new(input: &'s str) -> Self {
        Tokenizer { input, pos: 0, failed: false }
    }

    fn bytes(&self) -> &'s [u8] {
        self.input.as_bytes()
    }

    fn peek_at(&self, i: usize) -> Option<u8> {
        self.bytes().get(i).copied()
    }

    /// Whether a `<` at `i` opens markup (rather than being text).
    fn opens_markup(&self, i: usize) -> bool {
        match self.peek_at(i + 1) {
            Some(c) => c.is_ascii_alphabetic() || c == b'/' || c == b'!',
            None => false,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_at(self.pos) {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break
            }
        }
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.input.get(from..)?.find(needle).map(|i| from + i)
    }

    fn text(&mut self) -> Token<'s> {
        let start = self.pos;
        let mut i = start + 1;
        while i < self.input.len() {
            if self.peek_at(i) == Some(b'<') && self.opens_markup(i) {
                break
            }
            i += 1;
        }
        self.pos = i;
        Token::Text { text: &self.input[start..i], offset: start }
    }

    fn comment(&mut self) -> Result<Token<'s>, TokenizeError> {
        let start = self.pos;
        let body = start + 4;
        let end = self.find_from(body, "-->")
            .ok_or(TokenizeError::UnterminatedComment { offset: start })?;
        self.pos = end + 3;
        Ok(Token::Comment { text: &self.input[body..end], offset: start })
    }

    fn declaration(&mut self) -> Result<Token<'s>, TokenizeError> {
        let start = self.pos;
        let end = self.find_from(start, ">")
            .ok_or(TokenizeError::UnterminatedTag { offset: start })?;
        self.pos = end + 1;
        Ok(Token::Declaration { text: &self.input[start + 2..end], offset: start })
    }

    fn name(&mut self) -> &'s str {
        let start = self.pos;
        while let Some(c) = self.peek_at(self.pos) {
            if c.is_ascii_whitespace() || c == b'>' || c == b'/' {
                break
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn end_tag(&mut self) -> Result<Token<'s>, TokenizeError> {
        let start = self.pos;
        self.pos += 2;
        let name = self.name();
        let end = self.find_from(self.pos, ">")
            .ok_or(TokenizeError::UnterminatedTag { offset: start })?;
        self.pos = end + 1;
        Ok(Token::EndTag { name, offset: start })
    }

    fn attribute_name(&mut self) -> &'s str {
        let start = self.pos;
        while let Some(c) = self.peek_at(self.pos) {
            let ends_name = c.is_ascii_whitespace()
                || c == b'>'
                || (c == b'=' && self.pos > start)
                || (c == b'/' && self.peek_at(self.pos + 1) == Some(b'>'));
            if ends_name {
                break
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn attribute_value(&mut self) -> Result<AttributeValue<'s>, TokenizeError> {
        match self.peek_at(self.pos) {
            Some(q @ (b'"' | b'\'')) => {
                let open = self.pos;
                let quote = q as char;
                let end = self.find_from(open + 1, if q == b'"' { "\"" } else { "'" })
                    .ok_or(TokenizeError::UnterminatedAttributeValue { offset: open })?;
                self.pos = end + 1;
                Ok(AttributeValue {
                    text: &self.input[open + 1..end],
                    offset: open + 1,
                    quote: Some(quote),
                })
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek_at(self.pos) {
                    if c.is_ascii_whitespace() || c == b'>' {
                        break
                    }
                    self.pos += 1;
                }
                Ok(AttributeValue {
                    text: &self.input[start..self.pos],
                    offset: start,
                    quote: None,
                })
            }
        }
    }

    fn start_tag(&mut self) -> Result<Token<'s>, TokenizeError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.name();
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek_at(self.pos) {
                None => return Err(TokenizeError::UnterminatedTag { offset: start }),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(Token::StartTag { name, attributes, self_closing: false,
                                                offset: start })
                }
                Some(b'/') if self.peek_at(self.pos + 1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(Token::StartTag { name, attributes, self_closing: true,
                                                offset: start })
                }
                Some(b'/') => {
                    // stray slash, as browsers do
                    self.pos += 1;
                }
                Some(_) => {
                    let offset = self.pos;
                    let attname = self.attribute_name();
                    self.skip_whitespace();
                    let value =
                        if self.peek_at(self.pos) == Some(b'=') {
                            self.pos += 1;
                            self.skip_whitespace();
                            Some(self.attribute_value()?)
                        } else {
                            None
                        };
                    attributes.push(Attribute { name: attname, offset, value });
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Token<'s>, TokenizeError> {
        let rest = &self.input[self.pos..];
        if rest.starts_with("<!--") {
            self.comment()
        } else if rest.starts_with('<') && self.opens_markup(self.pos) {
            match self.peek_at(self.pos + 1) {
                Some(b'/') => self.end_tag(),
                Some(b'!') => self.declaration(),
                _ => self.start_tag(),
            }
        } else {
            Ok(self.text())
        }
    }
}

impl<'s> Iterator for Tokenizer<'s> {
    type Item = Result<Token<'s>, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.input.len() {
            return None
        }
        let r = self.next_token();
        if r.is_err() {
            self.failed = true;
        }
        Some(r)
    }
}
