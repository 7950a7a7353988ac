/*!
Entity resolution: turn a user reference (name pattern, hostname, address,
free text or numeric id) into remote object references.

- A numeric id skips the pattern search and is fetched directly.
- Every other form becomes exactly one filter expression; free text ORs
  across name, hostname and both IP fields.
- Zero matches is `EmptyResult`. Operations that act on one target call
  [`require_single`] before touching anything remote.
*/

use tracing::debug;

use crate::error::TwistError;
use crate::twist::Inventory;
use crate::twist::model::{EntityKind, Filter, ResolvedEntity};

/// How a reference selects records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Name(String),
    Host(String),
    Address(String),
    /// Free text matched against every searchable field.
    Any(String),
    Id(i64),
}

/// A reference to one category of remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReference {
    pub kind: EntityKind,
    pub query: Query,
}

impl EntityReference {
    pub fn new(kind: EntityKind, query: Query) -> Result<Self, TwistError> {
        match &query {
            Query::Host(_) | Query::Address(_) if kind != EntityKind::Server => {
                return Err(TwistError::InvalidReference(format!(
                    "{kind} references support only a name or an id"
                )));
            }
            Query::Name(v) | Query::Host(v) | Query::Address(v) | Query::Any(v)
                if v.trim().is_empty() =>
            {
                return Err(TwistError::InvalidReference(format!(
                    "empty {kind} reference"
                )));
            }
            _ => {}
        }
        Ok(Self { kind, query })
    }

    /// A value that is only digits is an id; anything else a name pattern.
    pub fn name_or_id(kind: EntityKind, raw: &str) -> Result<Self, TwistError> {
        match numeric_id(raw) {
            Some(id) => Self::new(kind, Query::Id(id)),
            None => Self::new(kind, Query::Name(raw.to_string())),
        }
    }

    /// Free text for servers (name, hostname or address), or an id.
    pub fn any_or_id(kind: EntityKind, raw: &str) -> Result<Self, TwistError> {
        match numeric_id(raw) {
            Some(id) => Self::new(kind, Query::Id(id)),
            None => Self::new(kind, Query::Any(raw.to_string())),
        }
    }

    /// The search filter, or `None` when the reference is a direct id.
    pub fn filter(&self) -> Option<Filter> {
        let vo = self.kind.vo_type();
        let expression = match (&self.query, self.kind) {
            (Query::Id(_), _) => return None,
            (Query::Name(v), EntityKind::Customer) | (Query::Any(v), EntityKind::Customer) => {
                let v = quote(v);
                format!(
                    "((CustomerVO.name like {v}) | (CustomerVO.displayName like {v}) | (customer_rc_name like {v}))"
                )
            }
            (Query::Name(v), _) => format!("{vo}.name like {}", quote(v)),
            (Query::Host(v), _) => format!("{vo}.hostName like {}", quote(v)),
            (Query::Address(v), _) => {
                let v = quote(v);
                format!("((device_interface_ip = {v}) | (device_management_ip = {v}))")
            }
            (Query::Any(v), EntityKind::Server) => {
                let v = quote(v);
                format!(
                    "((ServerVO.name like {v}) | (ServerVO.hostName like {v}) | (device_interface_ip = {v}) | (device_management_ip = {v}))"
                )
            }
            (Query::Any(v), _) => format!("{vo}.name like {}", quote(v)),
        };
        Some(Filter {
            expression,
            object_type: vo,
        })
    }
}

fn numeric_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Double-quote a filter value, backslash-escaping `\` and `"`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Read-only resolver over an [`Inventory`]. No retries, no caching.
pub struct Resolver<'a, I: Inventory + ?Sized> {
    inventory: &'a I,
}

impl<'a, I: Inventory + ?Sized> Resolver<'a, I> {
    pub fn new(inventory: &'a I) -> Self {
        Self { inventory }
    }

    /// All matches in the service's order; `EmptyResult` when there are none.
    pub fn resolve(&self, reference: &EntityReference) -> Result<Vec<ResolvedEntity>, TwistError> {
        let found = match (&reference.query, reference.filter()) {
            (Query::Id(id), _) => {
                debug!(kind = %reference.kind, id, "resolving by id");
                vec![self.inventory.get_by_id(reference.kind, *id)?]
            }
            (_, Some(filter)) => {
                debug!(kind = %reference.kind, filter = %filter.expression, "resolving by filter");
                self.inventory.find_refs(reference.kind, &filter)?
            }
            (_, None) => Vec::new(),
        };
        if found.is_empty() {
            return Err(TwistError::EmptyResult {
                role: reference.kind,
            });
        }
        Ok(found)
    }
}

/// Exactly-one guard used before every mutation or job submission.
pub fn require_single(
    role: EntityKind,
    candidates: &[ResolvedEntity],
) -> Result<&ResolvedEntity, TwistError> {
    match candidates {
        [only] => Ok(only),
        [] => Err(TwistError::EmptyResult { role }),
        many => Err(TwistError::AmbiguousResult {
            role,
            candidates: many.to_vec(),
        }),
    }
}
