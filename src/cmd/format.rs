/*!
format.rs

Human output helpers for the `twist` subcommands.

Report layout used across all subcommands:

    server 4242 = web01
    Status ................ SUCCESS(6)
    == Result ==============================

  - `field(label, value)` : dotted label/value line (value column 24)
  - `rule(title)`         : 40-column `=` rule, optionally titled
  - `listing(kind, e)`    : `<kind> <id> = <name>`
  - `wrap_text(s, width)` : greedy word wrap (script descriptions)
  - `color(role, s)`      : ANSI color when stdout is a terminal and NO_COLOR is unset

These helpers return strings and never print. JSON output paths do not use them.
*/

use std::io::IsTerminal;

use crate::twist::model::{EntityKind, ResolvedEntity};

const VALUE_COLUMN: usize = 24;
const RULE_WIDTH: usize = 40;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
}

impl StyleOptions {
    pub fn detect() -> Self {
        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        StyleOptions { use_color: false }
    }
}

/* -------------------------------------------------------------------------- */
/* Color                                                                      */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Success,
    Error,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Success => "38;5;82",
        Role::Error => "38;5;196",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

/* -------------------------------------------------------------------------- */
/* Report Lines                                                               */
/* -------------------------------------------------------------------------- */

/// `Status ................ SUCCESS(6)`
pub fn field(label: &str, value: impl AsRef<str>) -> String {
    let used = label.chars().count() + 2;
    let dots = VALUE_COLUMN.saturating_sub(used).max(3);
    format!("{label} {} {}", ".".repeat(dots), value.as_ref())
}

/// `== Result ====...` or a bare rule when `title` is `None`.
pub fn rule(title: Option<&str>) -> String {
    match title {
        None => "=".repeat(RULE_WIDTH),
        Some(t) => {
            let head = format!("== {t} ");
            let fill = RULE_WIDTH.saturating_sub(head.chars().count()).max(2);
            format!("{head}{}", "=".repeat(fill))
        }
    }
}

/// `server 4242 = web01`
pub fn listing(kind: EntityKind, entity: &ResolvedEntity) -> String {
    format!("{kind} {} = {}", entity.id, entity.name)
}

/* -------------------------------------------------------------------------- */
/* Text Helpers                                                               */
/* -------------------------------------------------------------------------- */

pub fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_aligns_values() {
        assert_eq!(field("Status", "SUCCESS(6)"), "Status ................ SUCCESS(6)");
        assert_eq!(field("Reason for Canceled", ""), "Reason for Canceled ... ");
        assert!(field("A label longer than the column", "x").contains(" ... x"));
    }

    #[test]
    fn rules_are_forty_wide() {
        assert_eq!(rule(None).len(), 40);
        let r = rule(Some("Result"));
        assert!(r.starts_with("== Result ="));
        assert_eq!(r.len(), 40);
    }

    #[test]
    fn listing_line() {
        let e = ResolvedEntity::new(4242, "web01");
        assert_eq!(listing(EntityKind::Server, &e), "server 4242 = web01");
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("restart the snmp daemon and report its status", 16);
        assert!(lines.iter().all(|l| l.chars().count() <= 16));
        assert_eq!(lines.join(" "), "restart the snmp daemon and report its status");
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn plain_style_has_no_escapes() {
        assert_eq!(color(Role::Error, "#- Fail.", &StyleOptions::plain()), "#- Fail.");
    }
}
