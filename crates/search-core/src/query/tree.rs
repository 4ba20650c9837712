//! Query tree types handed to the retrieval layer.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

/// Boolean clause requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// One term of a phrase, anchored at a relative position.
///
/// Several terms may share a position (alternatives written as `a|b`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseTerm {
    pub position: u32,
    pub text: String,
}

impl PhraseTerm {
    pub fn new(position: u32, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
        }
    }
}

/// A clause of a boolean query.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    pub occur: Occur,
    pub query: Query,
}

impl BooleanClause {
    pub fn new(occur: Occur, query: Query) -> Self {
        Self { occur, query }
    }
}

/// A parsed query (tree node).
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term {
        field: String,
        text: String,
    },
    Phrase {
        field: String,
        terms: Vec<PhraseTerm>,
        slop: u32,
    },
    /// `*` and `?` pattern. A backslash before `*`, `?` or another backslash makes it literal.
    Wildcard {
        field: String,
        pattern: String,
    },
    /// Wildcard whose only `*` is trailing.
    Prefix {
        field: String,
        prefix: String,
    },
    Fuzzy {
        field: String,
        text: String,
        min_similarity: f32,
    },
    Range {
        field: String,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    },
    MatchAll,
    /// Matches no document. Produced for empty input and for inputs whose
    /// clauses all analyze away.
    MatchNone,
    Boolean(Vec<BooleanClause>),
}

impl Query {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Builds a boolean query with the same occurrence on every clause.
    pub fn boolean(occur: Occur, queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Boolean(
            queries
                .into_iter()
                .map(|query| BooleanClause::new(occur, query))
                .collect(),
        )
    }

    /// Returns the field this node targets, if it is a leaf with a field.
    pub fn field(&self) -> Option<&str> {
        match self {
            Query::Term { field, .. }
            | Query::Phrase { field, .. }
            | Query::Wildcard { field, .. }
            | Query::Prefix { field, .. }
            | Query::Fuzzy { field, .. }
            | Query::Range { field, .. } => Some(field.as_str()),
            Query::MatchAll | Query::MatchNone | Query::Boolean(_) => None,
        }
    }

    /// Collects the fields of every leaf in the tree.
    pub fn leaf_fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        collect_leaf_fields(self, &mut fields);
        fields
    }
}

fn collect_leaf_fields<'q>(query: &'q Query, fields: &mut BTreeSet<&'q str>) {
    match query {
        Query::Boolean(clauses) => {
            for clause in clauses {
                collect_leaf_fields(&clause.query, fields);
            }
        }
        other => {
            if let Some(field) = other.field() {
                fields.insert(field);
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, text } => write!(f, "{field}:{text}"),
            Query::Phrase { field, terms, slop } => {
                write!(f, "{field}:\"")?;
                let mut previous: Option<u32> = None;
                for term in terms {
                    match previous {
                        Some(position) if position == term.position => write!(f, "|")?,
                        Some(position) => {
                            for _ in position + 1..term.position {
                                write!(f, " <>")?;
                            }
                            write!(f, " ")?;
                        }
                        None => {}
                    }
                    write!(f, "{}", term.text)?;
                    previous = Some(term.position);
                }
                write!(f, "\"")?;
                if *slop > 0 {
                    write!(f, "~{slop}")?;
                }
                Ok(())
            }
            Query::Wildcard { field, pattern } => write!(f, "{field}:{pattern}"),
            Query::Prefix { field, prefix } => write!(f, "{field}:{prefix}*"),
            Query::Fuzzy {
                field,
                text,
                min_similarity,
            } => write!(f, "{field}:{text}~{min_similarity}"),
            Query::Range {
                field,
                lower,
                upper,
                include_lower,
                include_upper,
            } => match (lower, upper) {
                (Some(lower), Some(upper)) => write!(
                    f,
                    "{field}:{}{lower} {upper}{}",
                    if *include_lower { "[" } else { "{" },
                    if *include_upper { "]" } else { "}" }
                ),
                (Some(lower), None) => {
                    write!(f, "{field}:{}{lower}", if *include_lower { ">=" } else { ">" })
                }
                (None, Some(upper)) => {
                    write!(f, "{field}:{}{upper}", if *include_upper { "<=" } else { "<" })
                }
                (None, None) => write!(f, "{field}:[]"),
            },
            Query::MatchAll => write!(f, "*"),
            Query::MatchNone => write!(f, "<none>"),
            Query::Boolean(clauses) => {
                for (index, clause) in clauses.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", clause.occur.prefix())?;
                    if matches!(clause.query, Query::Boolean(_)) {
                        write!(f, "({})", clause.query)?;
                    } else {
                        write!(f, "{}", clause.query)?;
                    }
                }
                Ok(())
            }
        }
    }
}
