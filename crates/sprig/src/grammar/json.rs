//! Front end for `grammar.json` text.
//!
//! Two things in the serialized grammar do not survive a plain typed decode:
//! a rule's `value` is a bare string or a bare number depending on the rule,
//! and the key order of `rules` (whose first entry is the start rule) is lost
//! in a map. This pass walks the JSON once, copying it through with each
//! scalar `value` wrapped as `{"String": ..}` or `{"Integer": ..}` so it
//! decodes into [`RuleValue`](super::RuleValue), and records the `rules` keys
//! in order. Validation of the document itself is left to `facet_json`.

use super::GrammarError;

/// The rewritten document and the declaration order of its rules.
pub(super) struct Prepared {
    pub json: String,
    pub rule_order: Vec<String>,
}

/// Where a value sits in the grammar document.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The document root.
    Root,
    /// The `rules` object: its keys are rule names.
    Rules,
    /// The payload of a `value` key.
    RuleValue,
    Other,
}

pub(super) fn prepare(json: &str) -> Result<Prepared, GrammarError> {
    let mut walker = Walker {
        src: json,
        pos: 0,
        out: String::with_capacity(json.len() + json.len() / 8),
        rule_order: Vec::new(),
    };
    walker.value(Role::Root)?;
    walker.skip_whitespace();
    if walker.pos < json.len() {
        return Err(walker.error("trailing characters"));
    }
    Ok(Prepared {
        json: walker.out,
        rule_order: walker.rule_order,
    })
}

struct Walker<'a> {
    src: &'a str,
    pos: usize,
    out: String,
    rule_order: Vec<String>,
}

impl<'a> Walker<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn error(&self, what: &str) -> GrammarError {
        GrammarError::JsonParse(format!("{what} at byte {}", self.pos))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), GrammarError> {
        self.skip_whitespace();
        if self.peek() != Some(byte) {
            return Err(self.error(&format!("expected '{}'", char::from(byte))));
        }
        self.pos += 1;
        self.out.push(char::from(byte));
        Ok(())
    }

    fn value(&mut self, role: Role) -> Result<(), GrammarError> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => self.object(role),
            Some(b'[') => self.array(),
            Some(b'"') => {
                let raw = self.string()?;
                self.scalar(role, "String", raw);
                Ok(())
            }
            Some(b'-' | b'0'..=b'9') => {
                let raw = self.token(is_number_byte);
                self.scalar(role, "Integer", raw);
                Ok(())
            }
            Some(b't' | b'f' | b'n') => {
                let raw = self.token(|b| b.is_ascii_alphabetic());
                if !matches!(raw, "true" | "false" | "null") {
                    return Err(self.error("unknown literal"));
                }
                self.out.push_str(raw);
                Ok(())
            }
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn scalar(&mut self, role: Role, variant: &str, raw: &str) {
        if role == Role::RuleValue {
            self.out.push_str("{\"");
            self.out.push_str(variant);
            self.out.push_str("\":");
            self.out.push_str(raw);
            self.out.push('}');
        } else {
            self.out.push_str(raw);
        }
    }

    fn object(&mut self, role: Role) -> Result<(), GrammarError> {
        self.expect(b'{')?;
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.out.push('}');
            return Ok(());
        }
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected an object key"));
            }
            let raw = self.string()?;
            let key: String =
                facet_json::from_str(raw).map_err(|e| GrammarError::JsonParse(e.to_string()))?;
            self.out.push_str(raw);
            self.expect(b':')?;

            let child = match role {
                Role::Rules => {
                    self.rule_order.push(key);
                    Role::Other
                }
                Role::Root if key == "rules" => Role::Rules,
                _ if key == "value" => Role::RuleValue,
                _ => Role::Other,
            };
            self.value(child)?;

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.out.push(',');
                }
                Some(b'}') => {
                    self.pos += 1;
                    self.out.push('}');
                    return Ok(());
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn array(&mut self) -> Result<(), GrammarError> {
        self.expect(b'[')?;
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.out.push(']');
            return Ok(());
        }
        loop {
            self.value(Role::Other)?;
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.out.push(',');
                }
                Some(b']') => {
                    self.pos += 1;
                    self.out.push(']');
                    return Ok(());
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    /// Consumes a string literal, returning it with its quotes and escapes.
    fn string(&mut self) -> Result<&'a str, GrammarError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(&self.src[start..self.pos]);
                }
                Some(b'\\') => self.pos += 2,
                Some(_) => self.pos += 1,
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
            }
        }
    }

    fn token(&mut self, accept: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }
}

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
}
