//! Query parser: turns user query strings into [`Query`] trees.

use std::sync::Arc;

use super::clean::clean_query_string;
use super::fields::{FieldSelector, FieldSet, ALL_FIELDS};
use super::lexer::{tokenize, Token, TokenKind};
use super::options::QueryParserOptions;
use super::tree::{BooleanClause, Occur, PhraseTerm, Query};
use crate::analysis::{AnalyzedToken, Analyzer, StandardAnalyzer};
use crate::error::{EngineError, Result};

/// Similarity used for `word~` when no value follows the tilde.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

// ---------------------------------------------------------------------------
// Query parser
// ---------------------------------------------------------------------------

/// Reusable query parser.
///
/// `parse` takes `&self` and never mutates the parser, so a parser can be
/// shared between threads. Replacing the field set needs `&mut self`.
#[derive(Debug, Clone)]
pub struct QueryParser {
    /// Valid clause targets. `None` means unrestricted.
    all_fields: Option<FieldSet>,
    /// Fields searched by clauses that name none. `None` falls back to
    /// `all_fields`.
    default_fields: Option<FieldSet>,
    analyzer: Arc<dyn Analyzer>,
    handle_parse_errors: bool,
    allow_any_fields: bool,
    wild_lower: bool,
    occur_default: Occur,
    default_slop: u32,
    clean_string: bool,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::from_parts(None, QueryParserOptions::default())
    }
}

impl QueryParser {
    /// Creates a parser.
    ///
    /// `default_fields` of `None` (or `"*"`) leaves clauses without a field
    /// searching `all_fields`.
    pub fn new(
        default_fields: Option<FieldSelector>,
        options: QueryParserOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self::from_parts(default_fields, options))
    }

    fn from_parts(default_fields: Option<FieldSelector>, options: QueryParserOptions) -> Self {
        let analyzer: Arc<dyn Analyzer> = match options.analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(StandardAnalyzer::default()),
        };
        Self {
            all_fields: options.fields.as_ref().and_then(FieldSelector::resolve),
            default_fields: default_fields.as_ref().and_then(FieldSelector::resolve),
            analyzer,
            handle_parse_errors: options.handle_parse_errors,
            allow_any_fields: options.allow_any_fields,
            wild_lower: options.wild_lower,
            occur_default: options.occur_default,
            default_slop: options.default_slop,
            clean_string: options.clean_string,
        }
    }

    /// Parses `input` into a query tree.
    ///
    /// With `handle_parse_errors` set, syntax and field errors yield the
    /// tree for the longest prefix of the input that parses, or
    /// [`Query::MatchNone`] when no prefix does.
    pub fn parse(&self, input: &str) -> Result<Query> {
        let cleaned;
        let source = if self.clean_string {
            cleaned = clean_query_string(input);
            cleaned.as_str()
        } else {
            input
        };

        match self.parse_source(source) {
            Ok(query) => Ok(query),
            Err(error) if self.handle_parse_errors && error.is_parse_error() => {
                log::warn!("query parse recovered input={source:?} error={error}");
                Ok(self.recover(source))
            }
            Err(error) => Err(error),
        }
    }

    /// Returns the restricted field names, or an empty list when unrestricted.
    pub fn fields(&self) -> Vec<String> {
        self.all_fields
            .as_ref()
            .map(FieldSet::to_vec)
            .unwrap_or_default()
    }

    /// Replaces `all_fields` wholesale. `"*"` removes the restriction.
    pub fn set_fields(&mut self, fields: impl Into<FieldSelector>) {
        self.all_fields = fields.into().resolve();
    }

    pub fn all_fields(&self) -> Option<&FieldSet> {
        self.all_fields.as_ref()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.all_fields.is_none()
    }

    pub fn default_fields(&self) -> Option<&FieldSet> {
        self.default_fields.as_ref()
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    pub fn occur_default(&self) -> Occur {
        self.occur_default
    }

    pub fn default_slop(&self) -> u32 {
        self.default_slop
    }

    fn parse_source(&self, source: &str) -> Result<Query> {
        let tokens = tokenize(source)?;
        Grammar::new(self, &tokens)
            .parse_query()
            .map_err(|failure| failure.error)
    }

    /// Parses the longest prefix of `source` that yields a query.
    ///
    /// Each candidate prefix ends before a token and is cleaned first, so
    /// groups, phrases and ranges left open by the cut are closed again.
    fn recover(&self, source: &str) -> Query {
        let (tokens, lexable) = match tokenize(source) {
            Ok(tokens) => (tokens, source.len()),
            Err(error) => (
                tokenize(&source[..error.position]).unwrap_or_default(),
                error.position,
            ),
        };

        let mut end = tokens.len();
        while end > 0 {
            let cut = tokens.get(end).map_or(lexable, |token| token.position);
            let prefix = clean_query_string(&source[..cut]);
            let failed_at = match tokenize(&prefix) {
                Ok(prefix_tokens) => match Grammar::new(self, &prefix_tokens).parse_query() {
                    Ok(query) => return query,
                    Err(failure) => failure.at,
                },
                Err(_) => end - 1,
            };
            end = failed_at.min(end - 1);
        }
        Query::MatchNone
    }

    fn field_allowed(&self, field: &str) -> bool {
        self.allow_any_fields
            || self
                .all_fields
                .as_ref()
                .map_or(true, |fields| fields.contains(field))
    }

    fn scope_fields(&self, scope: &FieldScope) -> Vec<String> {
        match scope {
            FieldScope::Fields(fields) => fields.clone(),
            FieldScope::Default => self
                .default_fields
                .as_ref()
                .or(self.all_fields.as_ref())
                .map(FieldSet::to_vec)
                .unwrap_or_default(),
        }
    }

    fn pattern_text(&self, text: &str) -> String {
        if self.wild_lower {
            text.to_lowercase()
        } else {
            text.to_string()
        }
    }

    /// Builds the query for one analyzed word in one field.
    fn term_query(&self, field: &str, text: &str) -> Option<Query> {
        let tokens = self.analyzer.analyze(field, text).collect::<Vec<_>>();
        match tokens.len() {
            0 => None,
            1 => tokens
                .into_iter()
                .next()
                .map(|token| Query::term(field, token.text)),
            _ => Some(Query::Phrase {
                field: field.to_string(),
                terms: positioned_terms(0, tokens),
                slop: self.default_slop,
            }),
        }
    }

    /// Builds the query for a quoted phrase in one field.
    ///
    /// `<>` leaves a position gap and `a|b` places alternatives at the same
    /// position.
    fn phrase_query(&self, field: &str, raw: &str, slop: u32) -> Option<Query> {
        let mut terms = Vec::new();
        let mut next_position = 0u32;

        for chunk in raw.split_whitespace() {
            if chunk == "<>" {
                next_position += 1;
                continue;
            }
            let mut span = 0u32;
            for alternative in chunk.split('|').filter(|alt| !alt.is_empty()) {
                let tokens = self
                    .analyzer
                    .analyze(field, alternative)
                    .collect::<Vec<_>>();
                let consumed = tokens
                    .iter()
                    .map(|token| token.position_increment)
                    .sum::<u32>();
                terms.extend(positioned_terms(next_position, tokens));
                span = span.max(consumed);
            }
            next_position += span.max(1);
        }

        let first = terms.iter().map(|term| term.position).min()?;
        for term in &mut terms {
            term.position -= first;
        }
        terms.sort_by_key(|term| term.position);

        if terms.iter().all(|term| term.position == 0) {
            let mut queries = terms
                .into_iter()
                .map(|term| Query::term(field, term.text))
                .collect::<Vec<_>>();
            return if queries.len() == 1 {
                queries.pop()
            } else {
                Some(Query::boolean(Occur::Should, queries))
            };
        }

        Some(Query::Phrase {
            field: field.to_string(),
            terms,
            slop,
        })
    }
}

/// Returns the literal prefix of a pattern whose only wildcard is a trailing
/// `*`, resolving escapes.
fn literal_prefix(pattern: &str) -> Option<String> {
    let body = pattern.strip_suffix('*')?;
    let mut prefix = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => prefix.push(chars.next()?),
            '*' | '?' => return None,
            _ => prefix.push(ch),
        }
    }
    Some(prefix)
}

/// Assigns absolute positions to a run of tokens starting at `base`.
fn positioned_terms(base: u32, tokens: Vec<AnalyzedToken>) -> Vec<PhraseTerm> {
    let mut cursor = 0u32;
    tokens
        .into_iter()
        .map(|token| {
            cursor += token.position_increment;
            PhraseTerm::new(base + cursor.saturating_sub(1), token.text)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

/// Fields a leaf expands over.
#[derive(Debug, Clone)]
enum FieldScope {
    /// Clause named no field: use the parser's default fields.
    Default,
    Fields(Vec<String>),
}

/// A clause whose occurrence is not yet settled by its enclosing group.
#[derive(Debug)]
struct Clause {
    modifier: Option<Occur>,
    query: Option<Query>,
}

impl Clause {
    fn empty() -> Self {
        Self {
            modifier: None,
            query: None,
        }
    }

    /// Turns a clause into a standalone query.
    fn into_query(self) -> Option<Query> {
        let query = self.query?;
        Some(match self.modifier {
            Some(Occur::MustNot) => {
                Query::Boolean(vec![BooleanClause::new(Occur::MustNot, query)])
            }
            _ => query,
        })
    }
}

#[derive(Debug)]
struct GrammarFailure {
    /// Index of the token the failure was detected at.
    at: usize,
    error: EngineError,
}

type Step<T> = std::result::Result<T, GrammarFailure>;

/// Recursive-descent parser over one token list.
///
/// ```text
/// query       := disjunction EOF
/// disjunction := conjunction ((OR | implicit) conjunction)*
/// conjunction := clause ((AND | implicit) clause)*
/// clause      := ('+' | '-' | '!' | NOT)* primary
/// primary     := '(' disjunction? ')' | fields ':' primary | phrase
///              | range | comparison | word ('~' number?)?
/// ```
///
/// The implicit join is OR or AND depending on the parser's default
/// occurrence.
struct Grammar<'p> {
    parser: &'p QueryParser,
    tokens: &'p [Token],
    index: usize,
}

impl<'p> Grammar<'p> {
    fn new(parser: &'p QueryParser, tokens: &'p [Token]) -> Self {
        Self {
            parser,
            tokens,
            index: 0,
        }
    }

    fn parse_query(mut self) -> Step<Query> {
        if self.tokens.is_empty() {
            return Ok(Query::MatchNone);
        }

        let clause = self.parse_disjunction(&FieldScope::Default)?;
        if let Some(token) = self.peek() {
            return Err(self.fail(
                self.index,
                format!(
                    "unexpected {} near byte {}",
                    token.kind.describe(),
                    token.position
                ),
            ));
        }

        Ok(clause.into_query().unwrap_or(Query::MatchNone))
    }

    fn parse_disjunction(&mut self, scope: &FieldScope) -> Step<Clause> {
        let mut parts = vec![self.parse_conjunction(scope)?];

        loop {
            if self.consume(&TokenKind::Or) {
                self.expect_operand("OR")?;
                parts.push(self.parse_conjunction(scope)?);
                continue;
            }
            if self.parser.occur_default == Occur::Should && self.next_starts_clause() {
                parts.push(self.parse_conjunction(scope)?);
                continue;
            }
            break;
        }

        Ok(combine(parts, Occur::Should))
    }

    fn parse_conjunction(&mut self, scope: &FieldScope) -> Step<Clause> {
        let mut parts = vec![self.parse_clause(scope)?];

        loop {
            if self.consume(&TokenKind::And) {
                self.expect_operand("AND")?;
                parts.push(self.parse_clause(scope)?);
                continue;
            }
            if self.parser.occur_default == Occur::Must && self.next_starts_clause() {
                parts.push(self.parse_clause(scope)?);
                continue;
            }
            break;
        }

        Ok(combine(parts, Occur::Must))
    }

    fn parse_clause(&mut self, scope: &FieldScope) -> Step<Clause> {
        let mut modifier = None;
        while let Some(token) = self.peek() {
            let occur = match token.kind {
                TokenKind::Plus => Occur::Must,
                TokenKind::Minus | TokenKind::Bang | TokenKind::Not => Occur::MustNot,
                _ => break,
            };
            let operator = token.kind.describe();
            self.index += 1;
            self.expect_operand(&operator)?;
            modifier = Some(occur);
        }

        let query = self.parse_primary(scope)?;
        Ok(Clause { modifier, query })
    }

    fn parse_primary(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let Some(token) = self.peek() else {
            return Err(self.fail(
                self.index,
                "expected query term but reached end of query".to_string(),
            ));
        };

        match &token.kind {
            TokenKind::LParen => self.parse_group(scope),
            TokenKind::Word { .. } if self.next_is_field_prefix() => {
                let fields = self.parse_field_list()?;
                self.parse_primary(&FieldScope::Fields(fields))
            }
            TokenKind::Word { .. } => self.parse_word(scope),
            TokenKind::Phrase(_) => self.parse_phrase(scope),
            TokenKind::LBracket | TokenKind::LBrace => self.parse_range(scope),
            TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => {
                self.parse_comparison(scope)
            }
            other => Err(self.fail(
                self.index,
                format!(
                    "unexpected {} near byte {}",
                    other.describe(),
                    token.position
                ),
            )),
        }
    }

    fn parse_group(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let open = self.index;
        self.index += 1;
        if self.consume(&TokenKind::RParen) {
            return Ok(None);
        }

        let clause = self.parse_disjunction(scope)?;
        if !self.consume(&TokenKind::RParen) {
            let position = self.position_at(open);
            return Err(self.fail(
                self.index,
                format!("missing closing ')' for '(' near byte {position}"),
            ));
        }
        Ok(clause.into_query())
    }

    /// Parses `name(|name)*:`, validating each name.
    fn parse_field_list(&mut self) -> Step<Vec<String>> {
        let mut fields: Vec<String> = Vec::new();

        loop {
            let at = self.index;
            let Some((text, pattern)) = self.next_word() else {
                return Err(self.fail(
                    at,
                    format!("expected field name near byte {}", self.position_at(at)),
                ));
            };

            if pattern.as_deref() == Some(ALL_FIELDS) {
                // Unrestricted parsers search at least their default fields.
                let all = match &self.parser.all_fields {
                    Some(fields) => fields.to_vec(),
                    None => self.parser.scope_fields(&FieldScope::Default),
                };
                for field in all {
                    if !fields.contains(&field) {
                        fields.push(field);
                    }
                }
            } else {
                if !self.parser.field_allowed(&text) {
                    return Err(GrammarFailure {
                        at,
                        error: EngineError::FieldNotAllowed { field: text },
                    });
                }
                if !fields.contains(&text) {
                    fields.push(text);
                }
            }

            if self.consume(&TokenKind::Pipe) {
                continue;
            }
            if self.consume(&TokenKind::Colon) {
                break;
            }
            return Err(self.fail(
                self.index,
                format!(
                    "expected ':' after field name near byte {}",
                    self.position_at(self.index)
                ),
            ));
        }

        self.expect_operand("':'")?;
        Ok(fields)
    }

    fn parse_word(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let Some((text, pattern)) = self.next_word() else {
            return Ok(None);
        };

        if self.consume(&TokenKind::Tilde) {
            let min_similarity = self.parse_similarity()?;
            let text = self.parser.pattern_text(&text);
            return Ok(self.expand(scope, |field| {
                Some(Query::Fuzzy {
                    field: field.to_string(),
                    text: text.clone(),
                    min_similarity,
                })
            }));
        }

        let Some(pattern) = pattern else {
            return Ok(self.expand(scope, |field| self.parser.term_query(field, &text)));
        };

        if pattern == "*" {
            return Ok(match scope {
                FieldScope::Default => Some(Query::MatchAll),
                FieldScope::Fields(_) => self.expand(scope, |field| {
                    Some(Query::Prefix {
                        field: field.to_string(),
                        prefix: String::new(),
                    })
                }),
            });
        }

        let pattern = self.parser.pattern_text(&pattern);
        let prefix = literal_prefix(&pattern);
        Ok(self.expand(scope, |field| {
            Some(if let Some(prefix) = &prefix {
                Query::Prefix {
                    field: field.to_string(),
                    prefix: prefix.clone(),
                }
            } else {
                Query::Wildcard {
                    field: field.to_string(),
                    pattern: pattern.clone(),
                }
            })
        }))
    }

    /// Reads the optional number after a fuzzy `~`.
    fn parse_similarity(&mut self) -> Step<f32> {
        let at = self.index;
        let Some(value) = self
            .adjacent_word()
            .and_then(|text| text.parse::<f32>().ok())
        else {
            return Ok(DEFAULT_MIN_SIMILARITY);
        };
        if !(0.0..1.0).contains(&value) {
            return Err(self.fail(
                at,
                format!(
                    "fuzzy similarity {value} must be in [0, 1) near byte {}",
                    self.position_at(at)
                ),
            ));
        }
        self.index += 1;
        Ok(value)
    }

    fn parse_phrase(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let Some(Token {
            kind: TokenKind::Phrase(raw),
            ..
        }) = self.tokens.get(self.index)
        else {
            return Ok(None);
        };
        self.index += 1;

        let slop = if self.consume(&TokenKind::Tilde) {
            let at = self.index;
            let Some(slop) = self
                .adjacent_word()
                .and_then(|text| text.parse::<u32>().ok())
            else {
                return Err(self.fail(
                    at,
                    format!(
                        "expected phrase slop after '~' near byte {}",
                        self.position_at(at)
                    ),
                ));
            };
            self.index += 1;
            slop
        } else {
            self.parser.default_slop
        };

        Ok(self.expand(scope, |field| self.parser.phrase_query(field, raw, slop)))
    }

    /// Parses `[a b]`, `{a b}`, mixed brackets, `[a TO b]` and `[a>`.
    fn parse_range(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let include_lower = self.consume(&TokenKind::LBracket);
        if !include_lower {
            self.index += 1;
        }

        let lower = self.expect_bound("range lower bound")?;
        if self.consume(&TokenKind::Gt) {
            return self.range(scope, lower, None, include_lower, false);
        }

        if self.peek_word() == Some("TO")
            && matches!(
                self.tokens.get(self.index + 1).map(|token| &token.kind),
                Some(TokenKind::Word { .. })
            )
        {
            self.index += 1;
        }

        let upper = self.expect_bound("range upper bound")?;
        let include_upper = if self.consume(&TokenKind::RBracket) {
            true
        } else if self.consume(&TokenKind::RBrace) {
            false
        } else {
            return Err(self.fail(
                self.index,
                format!(
                    "expected ']' or '}}' to close range near byte {}",
                    self.position_at(self.index)
                ),
            ));
        };

        self.range(scope, lower, upper, include_lower, include_upper)
    }

    /// Parses `<x`, `<=x`, `>x`, `>=x`, and the bracket-closed `<x]`, `<x}`.
    fn parse_comparison(&mut self, scope: &FieldScope) -> Step<Option<Query>> {
        let Some(operator) = self.tokens.get(self.index).map(|token| token.kind.clone()) else {
            return Ok(None);
        };
        self.index += 1;
        let bound = self.expect_bound("comparison value")?;

        match operator {
            TokenKind::Lt => {
                let include_upper = self.consume(&TokenKind::RBracket);
                if !include_upper {
                    self.consume(&TokenKind::RBrace);
                }
                self.range(scope, None, bound, false, include_upper)
            }
            TokenKind::LtEq => self.range(scope, None, bound, false, true),
            TokenKind::Gt => self.range(scope, bound, None, false, false),
            _ => self.range(scope, bound, None, true, false),
        }
    }

    fn range(
        &self,
        scope: &FieldScope,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Step<Option<Query>> {
        if lower.is_none() && upper.is_none() {
            return Err(self.fail(
                self.index.saturating_sub(1),
                format!(
                    "range needs at least one bound near byte {}",
                    self.position_at(self.index.saturating_sub(1))
                ),
            ));
        }
        Ok(self.expand(scope, |field| {
            Some(Query::Range {
                field: field.to_string(),
                lower: lower.clone(),
                upper: upper.clone(),
                include_lower: include_lower && lower.is_some(),
                include_upper: include_upper && upper.is_some(),
            })
        }))
    }

    /// Reads a range bound. `*` means unbounded.
    fn expect_bound(&mut self, what: &str) -> Step<Option<String>> {
        let at = self.index;
        match self.next_word() {
            Some((_, Some(pattern))) if pattern == "*" => Ok(None),
            Some((text, _)) => Ok(Some(text)),
            None => Err(self.fail(
                at,
                format!("expected {what} near byte {}", self.position_at(at)),
            )),
        }
    }

    /// Builds one leaf per field of `scope` and joins them with SHOULD.
    fn expand<F>(&self, scope: &FieldScope, mut build: F) -> Option<Query>
    where
        F: FnMut(&str) -> Option<Query>,
    {
        let mut queries = self
            .parser
            .scope_fields(scope)
            .iter()
            .filter_map(|field| build(field.as_str()))
            .collect::<Vec<_>>();
        match queries.len() {
            0 => None,
            1 => queries.pop(),
            _ => Some(Query::boolean(Occur::Should, queries)),
        }
    }

    // -- token helpers ------------------------------------------------------

    fn fail(&self, at: usize, message: String) -> GrammarFailure {
        GrammarFailure {
            at,
            error: EngineError::QueryParse(message),
        }
    }

    /// Fails when an operator is not followed by something to apply it to.
    fn expect_operand(&self, operator: &str) -> Step<()> {
        match self.peek().map(|token| &token.kind) {
            None | Some(TokenKind::RParen) => Err(self.fail(
                self.index,
                format!(
                    "expected a clause after {operator} near byte {}",
                    self.position_at(self.index)
                ),
            )),
            _ => Ok(()),
        }
    }

    fn next_starts_clause(&self) -> bool {
        matches!(
            self.peek().map(|token| &token.kind),
            Some(
                TokenKind::Word { .. }
                    | TokenKind::Phrase(_)
                    | TokenKind::LParen
                    | TokenKind::LBracket
                    | TokenKind::LBrace
                    | TokenKind::Lt
                    | TokenKind::LtEq
                    | TokenKind::Gt
                    | TokenKind::GtEq
                    | TokenKind::Plus
                    | TokenKind::Minus
                    | TokenKind::Bang
                    | TokenKind::Not
            )
        )
    }

    fn next_is_field_prefix(&self) -> bool {
        matches!(
            self.tokens.get(self.index + 1).map(|token| &token.kind),
            Some(TokenKind::Colon | TokenKind::Pipe)
        )
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        match self.peek() {
            Some(token) if &token.kind == kind => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    fn peek(&self) -> Option<&'p Token> {
        self.tokens.get(self.index)
    }

    fn peek_word(&self) -> Option<&'p str> {
        match self.peek().map(|token| &token.kind) {
            Some(TokenKind::Word { text, .. }) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the current word only if it directly follows the previous
    /// token with no whitespace, as in `~2`.
    fn adjacent_word(&self) -> Option<&'p str> {
        let previous = self.tokens.get(self.index.checked_sub(1)?)?;
        let current = self.peek()?;
        (current.position == previous.position + 1)
            .then(|| self.peek_word())
            .flatten()
    }

    fn next_word(&mut self) -> Option<(String, Option<String>)> {
        match self.peek().map(|token| &token.kind) {
            Some(TokenKind::Word { text, pattern }) => {
                self.index += 1;
                Some((text.clone(), pattern.clone()))
            }
            _ => None,
        }
    }

    fn position_at(&self, index: usize) -> usize {
        self.tokens
            .get(index)
            .or_else(|| self.tokens.last())
            .map(|token| token.position)
            .unwrap_or_default()
    }
}

/// Settles the occurrences of a group's parts.
///
/// A single part passes through with its own modifier so that `+a` and `a`
/// keep their meaning when they are the only clause. Parts that analyzed
/// away are dropped before deciding.
fn combine(parts: Vec<Clause>, default: Occur) -> Clause {
    let mut present = parts
        .into_iter()
        .filter(|part| part.query.is_some())
        .collect::<Vec<_>>();

    match present.len() {
        0 => Clause::empty(),
        1 => present.pop().unwrap_or_else(Clause::empty),
        _ => Clause {
            modifier: None,
            query: Some(Query::Boolean(
                present
                    .into_iter()
                    .filter_map(|part| {
                        let occur = part.modifier.unwrap_or(default);
                        part.query.map(|query| BooleanClause::new(occur, query))
                    })
                    .collect(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceAnalyzer;

    fn scenario_parser() -> QueryParser {
        QueryParser::new(
            Some(FieldSelector::from("body")),
            QueryParserOptions::default().with_fields("title|body"),
        )
        .expect("parser")
    }

    fn parser_with(options: QueryParserOptions) -> QueryParser {
        QueryParser::new(Some(FieldSelector::from("body")), options).expect("parser")
    }

    fn should(queries: impl IntoIterator<Item = Query>) -> Query {
        Query::boolean(Occur::Should, queries)
    }

    fn clause(occur: Occur, query: Query) -> BooleanClause {
        BooleanClause::new(occur, query)
    }

    #[test]
    fn implicit_should_over_default_field() {
        let query = scenario_parser().parse("hello world").expect("parse");
        assert_eq!(
            query,
            should([Query::term("body", "hello"), Query::term("body", "world")])
        );
    }

    #[test]
    fn explicit_field_mixes_with_default_expansion() {
        let query = scenario_parser().parse("title:foo bar").expect("parse");
        assert_eq!(
            query,
            should([Query::term("title", "foo"), Query::term("body", "bar")])
        );
    }

    #[test]
    fn disallowed_field_is_rejected() {
        let options = QueryParserOptions {
            allow_any_fields: false,
            ..QueryParserOptions::default()
        }
        .with_fields("title|body");
        let error = parser_with(options).parse("other:x").expect_err("field");
        assert!(matches!(error, EngineError::FieldNotAllowed { field } if field == "other"));
    }

    #[test]
    fn any_field_is_accepted_by_default() {
        let query = scenario_parser().parse("other:x").expect("parse");
        assert_eq!(query, Query::term("other", "x"));
    }

    #[test]
    fn fieldless_clause_expands_over_all_fields_without_defaults() {
        let parser = QueryParser::new(None, QueryParserOptions::default().with_fields("title|body"))
            .expect("parser");
        let query = parser.parse("rust").expect("parse");
        assert_eq!(
            query,
            should([Query::term("body", "rust"), Query::term("title", "rust")])
        );
        assert_eq!(
            query.leaf_fields().into_iter().collect::<Vec<_>>(),
            vec!["body", "title"]
        );
    }

    #[test]
    fn unrestricted_without_defaults_matches_nothing() {
        let parser = QueryParser::default();
        assert_eq!(parser.parse("rust").expect("parse"), Query::MatchNone);
    }

    #[test]
    fn must_default_joins_with_and() {
        let options = QueryParserOptions {
            occur_default: Occur::Must,
            ..QueryParserOptions::default()
        };
        let query = parser_with(options).parse("a1 b1").expect("parse");
        assert_eq!(
            query,
            Query::boolean(Occur::Must, [Query::term("body", "a1"), Query::term("body", "b1")])
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let query = scenario_parser().parse("a1 AND b1 OR c1").expect("parse");
        assert_eq!(
            query,
            should([
                Query::boolean(Occur::Must, [Query::term("body", "a1"), Query::term("body", "b1")]),
                Query::term("body", "c1"),
            ])
        );
    }

    #[test]
    fn prefix_operators_set_occurrence() {
        let query = scenario_parser().parse("+a1 b1 -c1 NOT d1").expect("parse");
        assert_eq!(
            query,
            Query::Boolean(vec![
                clause(Occur::Must, Query::term("body", "a1")),
                clause(Occur::Should, Query::term("body", "b1")),
                clause(Occur::MustNot, Query::term("body", "c1")),
                clause(Occur::MustNot, Query::term("body", "d1")),
            ])
        );
    }

    #[test]
    fn lone_negation_stays_boolean() {
        let query = scenario_parser().parse("-spam").expect("parse");
        assert_eq!(
            query,
            Query::Boolean(vec![clause(Occur::MustNot, Query::term("body", "spam"))])
        );
    }

    #[test]
    fn field_scope_applies_to_group() {
        let query = scenario_parser().parse("title:(foo bar)").expect("parse");
        assert_eq!(
            query,
            should([Query::term("title", "foo"), Query::term("title", "bar")])
        );
    }

    #[test]
    fn field_list_and_star_field() {
        let parser = scenario_parser();
        let expected = should([Query::term("title", "x1"), Query::term("body", "x1")]);
        assert_eq!(parser.parse("title|body:x1").expect("parse"), expected);
        assert_eq!(
            parser.parse("*:x1").expect("parse"),
            should([Query::term("body", "x1"), Query::term("title", "x1")])
        );
    }

    #[test]
    fn phrase_uses_default_slop_and_explicit_slop() {
        let options = QueryParserOptions {
            default_slop: 3,
            ..QueryParserOptions::default()
        };
        let parser = parser_with(options);
        let phrase = |slop| Query::Phrase {
            field: "body".to_string(),
            terms: vec![PhraseTerm::new(0, "quick"), PhraseTerm::new(1, "fox")],
            slop,
        };
        assert_eq!(parser.parse("\"Quick fox\"").expect("parse"), phrase(3));
        assert_eq!(parser.parse("\"quick fox\"~1").expect("parse"), phrase(1));
    }

    #[test]
    fn phrase_gaps_alternatives_and_stop_words() {
        let query = scenario_parser()
            .parse("\"the quick|fast <> fox\"")
            .expect("parse");
        assert_eq!(
            query,
            Query::Phrase {
                field: "body".to_string(),
                terms: vec![
                    PhraseTerm::new(0, "quick"),
                    PhraseTerm::new(0, "fast"),
                    PhraseTerm::new(2, "fox"),
                ],
                slop: 0,
            }
        );
    }

    #[test]
    fn single_term_phrase_becomes_term() {
        let query = scenario_parser().parse("\"Hello\"").expect("parse");
        assert_eq!(query, Query::term("body", "hello"));
    }

    #[test]
    fn word_analyzing_to_several_terms_becomes_phrase() {
        let query = scenario_parser().parse("e-mail").expect("parse");
        assert_eq!(
            query,
            Query::Phrase {
                field: "body".to_string(),
                terms: vec![PhraseTerm::new(0, "e"), PhraseTerm::new(1, "mail")],
                slop: 0,
            }
        );
    }

    #[test]
    fn stop_words_drop_clauses() {
        let parser = scenario_parser();
        assert_eq!(parser.parse("the").expect("parse"), Query::MatchNone);
        assert_eq!(
            parser.parse("the fox").expect("parse"),
            Query::term("body", "fox")
        );
    }

    #[test]
    fn wildcards_prefixes_and_match_all() {
        let parser = scenario_parser();
        assert_eq!(
            parser.parse("Te?t").expect("parse"),
            Query::Wildcard {
                field: "body".to_string(),
                pattern: "Te?t".to_string()
            }
        );
        assert_eq!(
            parser.parse("data*").expect("parse"),
            Query::Prefix {
                field: "body".to_string(),
                prefix: "data".to_string()
            }
        );
        assert_eq!(parser.parse("*").expect("parse"), Query::MatchAll);
    }

    #[test]
    fn wild_lower_lowercases_patterns() {
        let options = QueryParserOptions {
            wild_lower: true,
            ..QueryParserOptions::default()
        };
        let parser = parser_with(options);
        assert_eq!(
            parser.parse("Te?T").expect("parse"),
            Query::Wildcard {
                field: "body".to_string(),
                pattern: "te?t".to_string()
            }
        );
        assert_eq!(
            parser.parse("Rust~").expect("parse"),
            Query::Fuzzy {
                field: "body".to_string(),
                text: "rust".to_string(),
                min_similarity: DEFAULT_MIN_SIMILARITY,
            }
        );
    }

    #[test]
    fn fuzzy_with_similarity() {
        let query = scenario_parser().parse("color~0.8").expect("parse");
        assert_eq!(
            query,
            Query::Fuzzy {
                field: "body".to_string(),
                text: "color".to_string(),
                min_similarity: 0.8,
            }
        );
        assert!(scenario_parser().parse("color~1.5").is_err());
    }

    #[test]
    fn ranges_in_all_forms() {
        let parser = scenario_parser();
        let range = |lower: Option<&str>, upper: Option<&str>, il, iu| Query::Range {
            field: "year".to_string(),
            lower: lower.map(str::to_string),
            upper: upper.map(str::to_string),
            include_lower: il,
            include_upper: iu,
        };
        assert_eq!(
            parser.parse("year:[2000 2010]").expect("parse"),
            range(Some("2000"), Some("2010"), true, true)
        );
        assert_eq!(
            parser.parse("year:{2000 TO 2010]").expect("parse"),
            range(Some("2000"), Some("2010"), false, true)
        );
        assert_eq!(
            parser.parse("year:[2000>").expect("parse"),
            range(Some("2000"), None, true, false)
        );
        assert_eq!(
            parser.parse("year:<2010]").expect("parse"),
            range(None, Some("2010"), false, true)
        );
        assert_eq!(
            parser.parse("year:>=2000").expect("parse"),
            range(Some("2000"), None, true, false)
        );
        assert_eq!(
            parser.parse("year:<2010").expect("parse"),
            range(None, Some("2010"), false, false)
        );
    }

    #[test]
    fn syntax_errors_fail_without_recovery() {
        let options = QueryParserOptions {
            clean_string: false,
            ..QueryParserOptions::default()
        };
        let parser = parser_with(options);
        for input in ["(foo", "foo)", "\"foo", "title:", "foo AND", "[a b", "foo~0.5~"] {
            let error = parser.parse(input).expect_err(input);
            assert!(matches!(error, EngineError::QueryParse(_)), "{input}: {error}");
        }
    }

    #[test]
    fn parse_error_message_locates_failure() {
        let options = QueryParserOptions {
            clean_string: false,
            ..QueryParserOptions::default()
        };
        let error = parser_with(options).parse("foo ) bar").expect_err("stray paren");
        assert!(error.to_string().contains("near byte 4"), "{error}");
    }

    #[test]
    fn clean_string_repairs_unbalanced_input() {
        let parser = scenario_parser();
        assert_eq!(
            parser.parse("(foo bar").expect("parse"),
            should([Query::term("body", "foo"), Query::term("body", "bar")])
        );
        assert_eq!(
            parser.parse("\"foo bar").expect("parse"),
            Query::Phrase {
                field: "body".to_string(),
                terms: vec![PhraseTerm::new(0, "foo"), PhraseTerm::new(1, "bar")],
                slop: 0,
            }
        );
    }

    #[test]
    fn handle_parse_errors_keeps_valid_prefix() {
        let options = QueryParserOptions {
            handle_parse_errors: true,
            allow_any_fields: false,
            ..QueryParserOptions::default()
        }
        .with_fields("title|body");
        let parser = parser_with(options);
        assert_eq!(
            parser.parse("foo other:x").expect("recovered"),
            Query::term("body", "foo")
        );
        assert_eq!(
            parser.parse("foo AND").expect("recovered"),
            Query::term("body", "foo")
        );
        assert_eq!(parser.parse("other:x").expect("recovered"), Query::MatchNone);
    }

    #[test]
    fn handle_parse_errors_closes_groups_cut_by_recovery() {
        let options = QueryParserOptions {
            handle_parse_errors: true,
            allow_any_fields: false,
            ..QueryParserOptions::default()
        }
        .with_fields("title|body");
        let parser = parser_with(options);
        assert_eq!(
            parser.parse("(alpha other:x)").expect("recovered"),
            Query::term("body", "alpha")
        );
        assert_eq!(
            parser.parse("alpha (beta other:x) gamma").expect("recovered"),
            should([Query::term("body", "alpha"), Query::term("body", "beta")])
        );
    }

    #[test]
    fn handle_parse_errors_recovers_lexer_failures() {
        let options = QueryParserOptions {
            handle_parse_errors: true,
            clean_string: false,
            ..QueryParserOptions::default()
        };
        let parser = parser_with(options);
        assert_eq!(
            parser.parse("foo \"bar").expect("recovered"),
            Query::term("body", "foo")
        );
    }

    #[test]
    fn empty_input_matches_nothing() {
        let parser = scenario_parser();
        assert_eq!(parser.parse("").expect("parse"), Query::MatchNone);
        assert_eq!(parser.parse("   ").expect("parse"), Query::MatchNone);
        assert_eq!(parser.parse("()").expect("parse"), Query::MatchNone);
    }

    #[test]
    fn parse_is_deterministic() {
        let parser = QueryParser::new(
            None,
            QueryParserOptions::default().with_fields("a|b|c|d|e"),
        )
        .expect("parser");
        let input = "alpha +(beta OR \"gamma delta\"~2) -c:eps* year:[1 9]";
        let first = parser.parse(input).expect("parse");
        for _ in 0..10 {
            assert_eq!(parser.parse(input).expect("parse"), first);
        }
    }

    #[test]
    fn set_fields_replaces_and_star_unrestricts() {
        let mut parser = scenario_parser();
        assert_eq!(parser.fields(), vec!["body", "title"]);

        parser.set_fields(["summary"]);
        assert_eq!(parser.fields(), vec!["summary"]);

        parser.set_fields("*");
        assert!(parser.fields().is_empty());
        assert!(parser.is_unrestricted());
    }

    #[test]
    fn star_fields_permit_any_field_even_when_strict() {
        let options = QueryParserOptions {
            allow_any_fields: false,
            ..QueryParserOptions::default()
        }
        .with_fields("title");
        let mut parser = parser_with(options);
        assert!(parser.parse("other:x").is_err());

        parser.set_fields("*");
        assert_eq!(parser.parse("other:x").expect("parse"), Query::term("other", "x"));
    }

    #[test]
    fn star_field_falls_back_to_defaults_when_unrestricted() {
        let parser =
            QueryParser::new(Some(FieldSelector::from("body")), QueryParserOptions::default())
                .expect("parser");
        assert_eq!(parser.parse("*:foo").expect("parse"), Query::term("body", "foo"));
    }

    #[test]
    fn escaped_stars_stay_literal() {
        let parser = scenario_parser();
        assert_eq!(
            parser.parse(r"a\**").expect("parse"),
            Query::Prefix {
                field: "body".to_string(),
                prefix: "a*".to_string()
            }
        );
        assert_eq!(
            parser.parse(r"a\*b?").expect("parse"),
            Query::Wildcard {
                field: "body".to_string(),
                pattern: r"a\*b?".to_string()
            }
        );
    }

    #[test]
    fn empty_field_set_permits_nothing_when_strict() {
        let options = QueryParserOptions {
            allow_any_fields: false,
            ..QueryParserOptions::default()
        }
        .with_fields(Vec::<String>::new());
        let parser = parser_with(options);
        assert!(matches!(
            parser.parse("body:x"),
            Err(EngineError::FieldNotAllowed { .. })
        ));
    }

    #[test]
    fn custom_analyzer_is_used_per_field() {
        let options = QueryParserOptions::default()
            .with_analyzer(Arc::new(WhitespaceAnalyzer::new(false)));
        let parser = parser_with(options);
        assert_eq!(
            parser.parse("C++").expect("parse"),
            Query::term("body", "C++")
        );
    }
}
