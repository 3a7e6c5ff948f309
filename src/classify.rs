//! Turns free-form command-line tokens into a [`RunConfiguration`].
//!
//! Each token is offered to [`RULES`] in order and consumed by the first
//! rule that matches. Tokens no rule matches (including the program's own
//! path) are ignored.

use crate::target::{SizeMode, TargetProfile};
use crate::types::{Action, RunConfiguration};

/// Core counts accepted in `<n>core` tokens.
pub const ALLOWED_CORE_COUNTS: &[usize] = &[1, 2, 4, 8, 12];

/// Configuration being assembled. Size and benchmark tokens collect here so
/// the defaults only apply when none were given.
#[derive(Debug)]
pub struct Draft {
    pub config: RunConfiguration,
    sizes: Vec<String>,
    benchmarks: Vec<String>,
}

pub struct Rule {
    pub name: &'static str,
    matches: fn(&dyn TargetProfile, &str) -> bool,
    apply: fn(&mut Draft, &dyn TargetProfile, &str),
}

impl Rule {
    pub fn matches(&self, target: &dyn TargetProfile, token: &str) -> bool {
        (self.matches)(target, token)
    }
}

/// Precedence order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "repeat-count",
        matches: |_, token| parse_repeat_count(token).is_some(),
        apply: |draft, _, token| {
            if let Some(n) = parse_repeat_count(token) {
                draft.config.repeat_count = n;
            }
        },
    },
    Rule {
        name: "benchmark",
        matches: |target, token| target.benchmarks().iter().any(|b| *b == token),
        apply: |draft, _, token| push_unique(&mut draft.benchmarks, token),
    },
    Rule {
        name: "input-size",
        matches: |target, token| target.input_sizes().iter().any(|s| *s == token),
        apply: |draft, target, token| match target.size_mode() {
            SizeMode::Multi => push_unique(&mut draft.sizes, token),
            SizeMode::Single => draft.sizes = vec![token.to_string()],
        },
    },
    Rule {
        name: "action",
        matches: |target, token| {
            Action::from_verb(token).is_some_and(|a| target.actions().contains(&a))
        },
        apply: |draft, _, token| {
            if let Some(action) = Action::from_verb(token) {
                draft.config.action = action;
            }
        },
    },
    Rule {
        name: "core-count",
        matches: |target, token| target.uses_core_counts() && parse_core_token(token).is_some(),
        apply: |draft, _, token| {
            if let Some(n) = parse_core_token(token) {
                draft.config.core_counts.push(n);
            }
        },
    },
];

/// Which rule, if any, consumed a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub token: String,
    pub rule: Option<&'static str>,
}

#[derive(Debug)]
pub struct Classified {
    pub config: RunConfiguration,
    pub classifications: Vec<Classification>,
}

pub fn classify<S: AsRef<str>>(
    target: &dyn TargetProfile,
    tokens: &[S],
    original_core_count: usize,
) -> Classified {
    let mut draft = Draft {
        config: target.defaults(original_core_count),
        sizes: Vec::new(),
        benchmarks: Vec::new(),
    };

    let mut classifications = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = token.as_ref();
        let rule = RULES.iter().find(|r| r.matches(target, token));
        if let Some(rule) = rule {
            (rule.apply)(&mut draft, target, token);
        }
        classifications.push(Classification {
            token: token.to_string(),
            rule: rule.map(|r| r.name),
        });
    }

    let Draft {
        mut config,
        sizes,
        benchmarks,
    } = draft;
    if !sizes.is_empty() {
        config.input_sizes = sizes;
    }
    if !benchmarks.is_empty() {
        config.benchmarks = benchmarks;
    }

    Classified {
        config,
        classifications,
    }
}

/// `^[0-9]+$` that fits in a `u32`. Larger numbers match no rule.
fn parse_repeat_count(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// `<n>core` where `n` is written exactly as one of [`ALLOWED_CORE_COUNTS`].
pub fn parse_core_token(token: &str) -> Option<usize> {
    let digits = token.strip_suffix("core")?;
    ALLOWED_CORE_COUNTS
        .iter()
        .copied()
        .find(|n| n.to_string() == digits)
}

fn push_unique(list: &mut Vec<String>, token: &str) {
    if !list.iter().any(|t| t == token) {
        list.push(token.to_string());
    }
}
