//! Parser for clang's type spellings (`"const char *"`, `"int [4]"`,
//! `"void (*)(int)"`, `"void (struct Point *, int, int)"`).
//!
//! The JSON AST reports every type as a string in C declarator syntax; this
//! module turns those strings into [TypeNode] shapes. It is a deliberately
//! small recursive-descent parser over the abstract-declarator grammar, not a
//! C parser: declaration structure comes from the AST nodes themselves.

use crate::ir::{EnumId, FuncType, RecordId, RecordKind, TypeNode, TypedefId};
use cbind_core::Error;

/// Name resolution hooks the parser needs while building a [TypeNode].
/// Implemented by [crate::ir::DeclarationTree].
pub trait TypeInterner {
    fn record_ref(&mut self, kind: RecordKind, tag: &str) -> RecordId;
    fn enum_ref(&mut self, tag: &str) -> EnumId;
    fn typedef_ref(&self, name: &str) -> Option<TypedefId>;
}

impl TypeInterner for crate::ir::DeclarationTree {
    fn record_ref(&mut self, kind: RecordKind, tag: &str) -> RecordId {
        self.intern_record_tag(kind, tag)
    }

    fn enum_ref(&mut self, tag: &str) -> EnumId {
        self.intern_enum_tag(tag)
    }

    fn typedef_ref(&self, name: &str) -> Option<TypedefId> {
        self.lookup_typedef(name)
    }
}

/// Parses one type spelling.
pub fn parse(spelling: &str, interner: &mut dyn TypeInterner) -> Result<TypeNode, Error> {
    let tokens = lex(spelling)?;
    let mut parser = Parser {
        spelling,
        tokens,
        pos: 0,
        interner,
    };
    let ty = parser.parse_type()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("trailing tokens in type spelling"));
    }
    Ok(ty)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Ellipsis,
}

fn lex(spelling: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let bytes = spelling.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if spelling[i..].starts_with("...") => {
                tokens.push(Token::Ellipsis);
                i += 3;
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let value = spelling[start..i].parse::<u64>().map_err(|_| Error::Parse {
                    message: format!("bad array length in type spelling `{spelling}`"),
                    file: None,
                    line: None,
                })?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(spelling[start..i].to_string()));
            }
            _ => {
                return Err(Error::Parse {
                    message: format!("unexpected `{c}` in type spelling `{spelling}`"),
                    file: None,
                    line: None,
                });
            }
        }
    }
    Ok(tokens)
}

const QUALIFIERS: &[&str] = &[
    "const",
    "volatile",
    "restrict",
    "__restrict",
    "__restrict__",
    "_Nullable",
    "_Nonnull",
    "_Null_unspecified",
];

const PRIM_WORDS: &[&str] = &[
    "void", "bool", "_Bool", "char", "short", "int", "long", "float", "double", "signed",
    "unsigned", "__int128",
];

struct Parser<'a> {
    spelling: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    interner: &'a mut dyn TypeInterner,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::Parse {
            message: format!("{message} (in `{}`)", self.spelling),
            file: None,
            line: None,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), Error> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn parse_type(&mut self) -> Result<TypeNode, Error> {
        let (base, is_const) = self.parse_base()?;
        self.parse_declarator(base, is_const)
    }

    /// Parses the specifier part: qualifiers plus either a tag reference, a
    /// primitive word run, or a lone identifier (typedef or vendor type).
    fn parse_base(&mut self) -> Result<(TypeNode, bool), Error> {
        let mut is_const = false;
        loop {
            match self.peek() {
                Some(Token::Ident(word)) if QUALIFIERS.contains(&word.as_str()) => {
                    if word == "const" {
                        is_const = true;
                    }
                    self.pos += 1;
                }
                _ => break,
            }
        }

        let base = match self.peek() {
            Some(Token::Ident(word)) if word == "struct" || word == "union" || word == "enum" => {
                let keyword = word.clone();
                self.pos += 1;
                let Some(Token::Ident(tag)) = self.bump() else {
                    return Err(self.error("expected tag after struct/union/enum"));
                };
                match keyword.as_str() {
                    "struct" => TypeNode::Record(self.interner.record_ref(RecordKind::Struct, &tag)),
                    "union" => TypeNode::Record(self.interner.record_ref(RecordKind::Union, &tag)),
                    _ => TypeNode::Enum(self.interner.enum_ref(&tag)),
                }
            }
            Some(Token::Ident(word)) if PRIM_WORDS.contains(&word.as_str()) => {
                let mut words = Vec::new();
                while let Some(Token::Ident(w)) = self.peek() {
                    if PRIM_WORDS.contains(&w.as_str()) {
                        words.push(w.clone());
                        self.pos += 1;
                    } else if QUALIFIERS.contains(&w.as_str()) {
                        if w == "const" {
                            is_const = true;
                        }
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                canonical_primitive(&words).ok_or_else(|| {
                    self.error(&format!("unintelligible primitive `{}`", words.join(" ")))
                })?
            }
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.bump() else {
                    unreachable!();
                };
                // Trailing qualifiers bind to the base ("char const *").
                while let Some(Token::Ident(w)) = self.peek() {
                    if QUALIFIERS.contains(&w.as_str()) {
                        if w == "const" {
                            is_const = true;
                        }
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                match self.interner.typedef_ref(&name) {
                    Some(id) => TypeNode::Typedef(id),
                    // Unknown spellings flow through as primitives so the
                    // resolver can report them against the primitive table.
                    None => TypeNode::Primitive(name),
                }
            }
            _ => return Err(self.error("expected a type specifier")),
        };
        Ok((base, is_const))
    }

    /// Parses the abstract declarator around `base`: pointer prefixes, an
    /// optional parenthesized inner declarator, then array and function
    /// suffixes. Suffixes bind tighter than pointer prefixes; a nested
    /// declarator wraps the fully-suffixed outer type.
    fn parse_declarator(&mut self, base: TypeNode, base_const: bool) -> Result<TypeNode, Error> {
        let mut ty = base;
        let mut inner_const = base_const;
        while self.eat(&Token::Star) {
            let mut this_const = false;
            while let Some(Token::Ident(w)) = self.peek() {
                if QUALIFIERS.contains(&w.as_str()) {
                    if w == "const" {
                        this_const = true;
                    }
                    self.pos += 1;
                } else {
                    break;
                }
            }
            ty = TypeNode::Pointer {
                pointee: Box::new(ty),
                is_const: inner_const,
            };
            inner_const = this_const;
        }

        let nested = if self.peek() == Some(&Token::LParen)
            && matches!(
                self.peek_at(1),
                Some(Token::Star) | Some(Token::LParen) | Some(Token::LBracket)
            ) {
            self.pos += 1;
            let start = self.pos;
            let mut depth = 1usize;
            while depth > 0 {
                match self.bump() {
                    Some(Token::LParen) => depth += 1,
                    Some(Token::RParen) => depth -= 1,
                    Some(_) => {}
                    None => return Err(self.error("unbalanced parentheses")),
                }
            }
            Some((start, self.pos - 1))
        } else {
            None
        };

        loop {
            if self.eat(&Token::LBracket) {
                if self.eat(&Token::RBracket) {
                    ty = TypeNode::IncompleteArray { elem: Box::new(ty) };
                } else {
                    let Some(Token::Number(len)) = self.bump() else {
                        return Err(self.error("expected array length"));
                    };
                    self.expect(Token::RBracket, "`]`")?;
                    ty = TypeNode::Array {
                        elem: Box::new(ty),
                        len,
                    };
                }
            } else if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                let func = self.parse_params(ty)?;
                ty = TypeNode::Function(Box::new(func));
            } else {
                break;
            }
        }

        if let Some((start, end)) = nested {
            let outer_end = self.pos;
            self.pos = start;
            // Reparse the saved inner declarator with the outer type as its
            // base, stopping at the saved closing parenthesis.
            let wrapped = self.parse_declarator_until(end, ty, inner_const)?;
            self.pos = outer_end;
            return Ok(wrapped);
        }
        Ok(ty)
    }

    fn parse_declarator_until(
        &mut self,
        end: usize,
        base: TypeNode,
        base_const: bool,
    ) -> Result<TypeNode, Error> {
        let saved: Vec<Token> = self.tokens[end..].to_vec();
        self.tokens.truncate(end);
        let result = self.parse_declarator(base, base_const);
        self.tokens.extend(saved);
        match result {
            Ok(ty) if self.pos == end => Ok(ty),
            Ok(_) => Err(self.error("trailing tokens in nested declarator")),
            Err(e) => Err(e),
        }
    }

    fn parse_params(&mut self, ret: TypeNode) -> Result<FuncType, Error> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.eat(&Token::RParen) {
            return Ok(FuncType {
                ret,
                params,
                variadic,
            });
        }
        loop {
            if self.eat(&Token::Ellipsis) {
                variadic = true;
                self.expect(Token::RParen, "`)` after `...`")?;
                break;
            }
            let param = self.parse_type()?;
            if param != TypeNode::Void {
                params.push(param);
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen, "`)` after parameter list")?;
            break;
        }
        Ok(FuncType {
            ret,
            params,
            variadic,
        })
    }
}

/// Normalizes a run of primitive specifier words to its canonical spelling.
fn canonical_primitive(words: &[String]) -> Option<TypeNode> {
    let mut longs = 0u32;
    let mut short = false;
    let mut unsigned = false;
    let mut signed = false;
    let mut base: Option<&str> = None;
    for word in words {
        match word.as_str() {
            "long" => longs += 1,
            "short" => short = true,
            "unsigned" => unsigned = true,
            "signed" => signed = true,
            "void" | "bool" | "char" | "int" | "float" | "double" | "__int128" => {
                base = Some(word.as_str());
            }
            "_Bool" => base = Some("bool"),
            _ => return None,
        }
    }
    let spelling = match base {
        Some("void") => "void".to_string(),
        Some("bool") => "bool".to_string(),
        Some("float") => "float".to_string(),
        Some("double") => {
            if longs > 0 {
                "long double".to_string()
            } else {
                "double".to_string()
            }
        }
        Some("char") => {
            if unsigned {
                "unsigned char".to_string()
            } else if signed {
                "signed char".to_string()
            } else {
                "char".to_string()
            }
        }
        Some("__int128") => {
            if unsigned {
                "unsigned __int128".to_string()
            } else {
                "__int128".to_string()
            }
        }
        Some("int") | None => {
            let width = if short {
                "short"
            } else {
                match longs {
                    0 => "int",
                    1 => "long",
                    _ => "long long",
                }
            };
            if unsigned {
                format!("unsigned {width}")
            } else {
                width.to_string()
            }
        }
        Some(_) => return None,
    };
    if spelling == "void" {
        Some(TypeNode::Void)
    } else {
        Some(TypeNode::Primitive(spelling))
    }
}
